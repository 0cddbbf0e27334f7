//! dummyjson.com: offset pagination, products with a nested reviews
//! child table.

use sluice_error::ConfigError;

use crate::model::{DataModel, FieldDef, FieldType};
use crate::source::{
    ApiConfig, ApiEndpointConfig, OffsetPagination, PaginationConfig, TableConfig, TransportKind,
};

pub fn config() -> Result<ApiConfig, ConfigError> {
    let products = DataModel::new(
        "DummyJsonProducts",
        vec![
            FieldDef::new("id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("title", FieldType::Text, "root.title"),
            FieldDef::new("description", FieldType::Text, "root.description"),
            FieldDef::new("category", FieldType::Text, "root.category"),
            FieldDef::new("price", FieldType::Double, "root.price"),
            FieldDef::new("rating", FieldType::Double, "root.rating"),
            FieldDef::new("stock", FieldType::BigInt, "root.stock"),
            FieldDef::new("tags", FieldType::Text, "root.tags[*]"),
            FieldDef::new("brand", FieldType::Text, "root.brand").nullable(),
            FieldDef::new("sku", FieldType::Text, "root.sku"),
            FieldDef::new("dimensions_width", FieldType::Double, "root.dimensions.width"),
            FieldDef::new("dimensions_height", FieldType::Double, "root.dimensions.height"),
            FieldDef::new("dimensions_depth", FieldType::Double, "root.dimensions.depth"),
            FieldDef::new("created_at", FieldType::Timestamp, "root.meta.createdAt"),
            FieldDef::new("updated_at", FieldType::Timestamp, "root.meta.updatedAt"),
            FieldDef::new("barcode", FieldType::Text, "root.meta.barcode"),
            FieldDef::new("thumbnail", FieldType::Text, "root.thumbnail"),
        ],
    )?;

    let reviews = DataModel::new(
        "DummyJsonReviews",
        vec![
            FieldDef::new("product_id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("reviewer_email", FieldType::Text, "root.reviews[*].reviewerEmail")
                .primary_key(),
            FieldDef::new("reviewer_name", FieldType::Text, "root.reviews[*].reviewerName"),
            FieldDef::new("rating", FieldType::BigInt, "root.reviews[*].rating"),
            FieldDef::new("comment", FieldType::Text, "root.reviews[*].comment"),
            FieldDef::new("date", FieldType::Timestamp, "root.reviews[*].date"),
        ],
    )?;

    Ok(
        ApiConfig::new("dummyjson", "https://dummyjson.com/", TransportKind::Rest)
            .pagination(PaginationConfig::Offset(OffsetPagination {
                offset_param: "skip".to_string(),
                limit_param: "limit".to_string(),
                offset: 0,
                limit: 10,
                start_offset: 0,
                max_concurrent: 5,
            }))
            .endpoint(
                "products",
                ApiEndpointConfig::new()
                    .json_entrypoint("products")
                    .table(TableConfig::new(products).audit_query(
                        "SELECT CASE WHEN SUM(CASE WHEN price < 0 THEN 1 ELSE 0 END) = 0 \
                         THEN 1 ELSE 0 END AS price_non_negative, \
                         CASE WHEN COUNT(*) > 0 THEN 1 ELSE 0 END AS has_rows \
                         FROM {table}",
                    ))
                    .table(TableConfig::new(reviews)),
            ),
    )
}
