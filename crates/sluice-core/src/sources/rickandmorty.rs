//! rickandmortyapi.com: GraphQL transport, single-request endpoint.

use serde_json::json;
use sluice_error::ConfigError;

use crate::model::{DataModel, FieldDef, FieldType};
use crate::source::{ApiConfig, ApiEndpointConfig, TableConfig, TransportKind};

pub fn config() -> Result<ApiConfig, ConfigError> {
    let characters = DataModel::new(
        "RickAndMortyCharacters",
        vec![
            FieldDef::new("id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("name", FieldType::Text, "root.name"),
            FieldDef::new("status", FieldType::Text, "root.status"),
            FieldDef::new("species", FieldType::Text, "root.species"),
        ],
    )?;

    Ok(
        ApiConfig::new("rickandmorty", "https://rickandmortyapi.com/graphql", TransportKind::GraphQl)
            .header("Content-Type", "application/json")
            .endpoint(
                "characters",
                ApiEndpointConfig::new()
                    .json_entrypoint("data.characters.results")
                    .body(json!({
                        "query": "query GetCharacters($page: Int) { \
                                  characters(page: $page) { \
                                  info { count pages next prev } \
                                  results { id name status species } } }",
                        "variables": {"page": 1},
                    }))
                    .table(TableConfig::new(characters)),
            ),
    )
}
