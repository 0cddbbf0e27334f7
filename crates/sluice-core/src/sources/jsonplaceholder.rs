//! jsonplaceholder.typicode.com: unpaginated REST, body is the item list.

use sluice_error::ConfigError;

use crate::model::{DataModel, FieldDef, FieldType};
use crate::source::{ApiConfig, ApiEndpointConfig, TableConfig, TransportKind};

pub fn config() -> Result<ApiConfig, ConfigError> {
    let posts = DataModel::new(
        "JsonPlaceholderPosts",
        vec![
            FieldDef::new("id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("user_id", FieldType::BigInt, "root.userId"),
            FieldDef::new("title", FieldType::Text, "root.title"),
            FieldDef::new("body", FieldType::Text, "root.body"),
        ],
    )?;

    Ok(
        ApiConfig::new("jsonplaceholder", "https://jsonplaceholder.typicode.com/", TransportKind::Rest)
            .endpoint("posts", ApiEndpointConfig::new().table(TableConfig::new(posts))),
    )
}
