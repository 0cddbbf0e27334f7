//! JSON entrypoint resolution and item extraction.

use serde_json::Value;
use sluice_error::HttpError;

use crate::source::{ApiConfig, ApiEndpointConfig};

/// Endpoint-level entrypoint overrides the source-level one.
pub fn resolve_entrypoint(
    source: &ApiConfig,
    endpoint_config: &ApiEndpointConfig,
) -> Option<String> {
    endpoint_config
        .json_entrypoint
        .clone()
        .or_else(|| source.json_entrypoint.clone())
}

/// Extract the item list from a response body.
///
/// The entrypoint is a dotted path into the body; a missing step is an
/// error. A list yields its items, anything else is wrapped as a single
/// item.
pub fn extract_items(data: &Value, entrypoint: Option<&str>) -> Result<Vec<Value>, HttpError> {
    let node = match entrypoint {
        None => data,
        Some(path) => {
            let mut current = data;
            for part in path.split('.') {
                current = current.get(part).ok_or_else(|| HttpError::EntrypointMissing {
                    entrypoint: path.to_string(),
                })?;
            }
            current
        }
    };
    match node {
        Value::Array(items) => Ok(items.clone()),
        other => Ok(vec![other.clone()]),
    }
}
