//! api.stripe.com: cursor pagination with bearer auth, incremental.

use sluice_error::ConfigError;

use crate::model::{DataModel, FieldDef, FieldType};
use crate::settings::Settings;
use crate::source::{
    ApiConfig, ApiEndpointConfig, AuthConfig, CursorPagination, PaginationConfig, TableConfig,
    TransportKind,
};

pub fn config(settings: &Settings) -> Result<ApiConfig, ConfigError> {
    let charges = DataModel::new(
        "StripeCharges",
        vec![
            FieldDef::new("id", FieldType::Text, "root.id").primary_key(),
            FieldDef::new("amount", FieldType::BigInt, "root.amount"),
            FieldDef::new("currency", FieldType::Text, "root.currency").max_length(3),
            FieldDef::new("status", FieldType::Text, "root.status"),
            FieldDef::new("customer", FieldType::Text, "root.customer").nullable(),
            FieldDef::new("description", FieldType::Text, "root.description").nullable(),
            FieldDef::new("paid", FieldType::Boolean, "root.paid"),
            FieldDef::new("created", FieldType::BigInt, "root.created"),
        ],
    )?;

    let token = settings.stripe_api_key.clone().unwrap_or_default();

    Ok(
        ApiConfig::new("stripe", "https://api.stripe.com/v1", TransportKind::Rest)
            .json_entrypoint("data")
            .authentication(AuthConfig::Bearer { token })
            .pagination(PaginationConfig::Cursor(CursorPagination {
                cursor_param: "starting_after".to_string(),
                next_cursor_key: "data[-1].id".to_string(),
                limit_param: "limit".to_string(),
                limit: 100,
                initial_value: None,
            }))
            .endpoint(
                "charges",
                ApiEndpointConfig::new().incremental().table(TableConfig::new(charges)),
            ),
    )
}
