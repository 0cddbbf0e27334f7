//! Stage-table writers, selected by driver name.

mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use sluice_error::{ConfigError, SluiceError};
use sqlx::PgPool;

use crate::parse::{Record, TableBatch};

pub use postgres::PostgresWriter;

const SUPPORTED_WRITERS: [&str; 1] = ["postgresql"];

/// Inserts parsed rows into per-endpoint stage tables.
#[async_trait]
pub trait StageWriter: Send + Sync {
    /// Insert every table batch, in bounded sub-batches, one transaction
    /// per sub-batch.
    async fn write(&self, table_batches: &[TableBatch]) -> Result<(), SluiceError>;

    /// Dialect hook: adapt a record's values before binding.
    fn convert_record(&self, record: &Record) -> Record {
        record.clone()
    }
}

/// Writer for the configured driver.
pub fn create_writer(
    drivername: &str,
    pool: PgPool,
    batch_size: usize,
) -> Result<Arc<dyn StageWriter>, ConfigError> {
    match drivername {
        "postgresql" => Ok(Arc::new(PostgresWriter::new(pool, batch_size))),
        other => Err(ConfigError::UnsupportedDriver {
            driver: other.to_string(),
            supported: SUPPORTED_WRITERS.join(", "),
        }),
    }
}
