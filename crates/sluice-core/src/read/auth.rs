//! Authentication strategies applied to outgoing requests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use sluice_error::ConfigError;

use crate::source::AuthConfig;

/// Apply the configured strategy to a request's headers.
pub fn apply_auth(
    auth: &AuthConfig,
    source_name: &str,
    headers: &mut HeaderMap,
) -> Result<(), ConfigError> {
    let value = match auth {
        AuthConfig::Basic { username, password } => {
            let credentials = STANDARD.encode(format!("{username}:{password}"));
            format!("Basic {credentials}")
        }
        AuthConfig::Bearer { token } => format!("Bearer {token}"),
    };
    let mut value = HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidHeader {
        source_name: source_name.to_string(),
        name: AUTHORIZATION.to_string(),
    })?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
