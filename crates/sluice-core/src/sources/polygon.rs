//! api.polygon.io reference data: next-URL pagination with bearer auth.
//!
//! The tickers endpoint rate-limits aggressively on free tiers, hence
//! the long backoff starting delay.

use sluice_error::ConfigError;

use crate::model::{DataModel, FieldDef, FieldType};
use crate::settings::Settings;
use crate::source::{
    ApiConfig, ApiEndpointConfig, AuthConfig, NextUrlPagination, PaginationConfig, TableConfig,
    TransportKind,
};

pub fn config(settings: &Settings) -> Result<ApiConfig, ConfigError> {
    let tickers = DataModel::new(
        "PolygonTickers",
        vec![
            FieldDef::new("ticker", FieldType::Text, "root.ticker").primary_key(),
            FieldDef::new("name", FieldType::Text, "root.name"),
            FieldDef::new("market", FieldType::Text, "root.market"),
            FieldDef::new("locale", FieldType::Text, "root.locale"),
            FieldDef::new("active", FieldType::Boolean, "root.active"),
            FieldDef::new("currency_name", FieldType::Text, "root.currency_name").max_length(3),
            FieldDef::new("primary_exchange", FieldType::Text, "root.primary_exchange").nullable(),
            FieldDef::new("cik", FieldType::Text, "root.cik").nullable(),
            FieldDef::new("composite_figi", FieldType::Text, "root.composite_figi").nullable(),
            FieldDef::new("share_class_figi", FieldType::Text, "root.share_class_figi").nullable(),
            FieldDef::new("kind", FieldType::Text, "root.type"),
            FieldDef::new("last_updated_utc", FieldType::Timestamp, "root.last_updated_utc"),
        ],
    )?;

    let token = settings.polygon_api_key.clone().unwrap_or_default();

    Ok(
        ApiConfig::new("polygon", "https://api.polygon.io/v3/reference", TransportKind::Rest)
            .authentication(AuthConfig::Bearer { token })
            .pagination(PaginationConfig::NextUrl(NextUrlPagination {
                next_url_key: "next_url".to_string(),
            }))
            .endpoint(
                "tickers",
                ApiEndpointConfig::new()
                    .json_entrypoint("results")
                    .backoff_starting_delay(60.0)
                    .incremental()
                    .table(TableConfig::new(tickers)),
            ),
    )
}
