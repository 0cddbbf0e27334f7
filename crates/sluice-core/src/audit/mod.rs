//! Stage-table audits, selected by driver name.

mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use sluice_error::{ConfigError, SluiceError};
use sqlx::PgPool;

use crate::source::ApiEndpointConfig;

pub use postgres::PostgresAuditor;

const SUPPORTED_AUDITORS: [&str; 1] = ["postgresql"];

/// Validates stage tables before publish: grain uniqueness always, named
/// boolean data audits when a table declares an `audit_query`.
#[async_trait]
pub trait Auditor: Send + Sync {
    /// Fail when any stage table holds duplicate primary-key tuples.
    async fn audit_grain(&self) -> Result<(), SluiceError>;

    /// Run declared audit queries; zero-valued result columns fail.
    async fn audit_data(&self) -> Result<(), SluiceError>;
}

/// Auditor for the configured driver.
pub fn create_auditor(
    drivername: &str,
    pool: PgPool,
    endpoint_config: &ApiEndpointConfig,
) -> Result<Arc<dyn Auditor>, ConfigError> {
    match drivername {
        "postgresql" => Ok(Arc::new(PostgresAuditor::new(pool, endpoint_config))),
        other => Err(ConfigError::UnsupportedDriver {
            driver: other.to_string(),
            supported: SUPPORTED_AUDITORS.join(", "),
        }),
    }
}
