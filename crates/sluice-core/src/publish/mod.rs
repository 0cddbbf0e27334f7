//! Stage-to-target publishers, selected by driver name.

mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use sluice_error::{ConfigError, SluiceError};
use sqlx::PgPool;

use crate::source::ApiEndpointConfig;

pub use postgres::PostgresPublisher;

const SUPPORTED_PUBLISHERS: [&str; 1] = ["postgresql"];

/// Merges stage rows into target tables with hash-based change
/// detection: unchanged rows incur no update, `etl_updated_at` moves only
/// when a real change lands.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self) -> Result<(), SluiceError>;
}

/// Publisher for the configured driver.
pub fn create_publisher(
    drivername: &str,
    pool: PgPool,
    endpoint_config: &ApiEndpointConfig,
) -> Result<Arc<dyn Publisher>, ConfigError> {
    match drivername {
        "postgresql" => Ok(Arc::new(PostgresPublisher::new(pool, endpoint_config))),
        other => Err(ConfigError::UnsupportedDriver {
            driver: other.to_string(),
            supported: SUPPORTED_PUBLISHERS.join(", "),
        }),
    }
}
