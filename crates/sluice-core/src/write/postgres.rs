//! PostgreSQL stage writer.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sluice_error::SluiceError;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::model::{FieldDef, FieldType};
use crate::parse::{Record, TableBatch};
use crate::write::StageWriter;

/// Multi-row inserts via `QueryBuilder::push_values`, chunked into
/// sub-batches of `batch_size`, one transaction each.
pub struct PostgresWriter {
    pool: PgPool,
    batch_size: usize,
    /// Cached column lists per model, built once from the first batches.
    columns: Mutex<HashMap<String, String>>,
}

impl PostgresWriter {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            columns: Mutex::new(HashMap::new()),
        }
    }

    fn insert_prefix(&self, table_batch: &TableBatch) -> String {
        let mut cache = self.columns.lock().expect("column cache poisoned");
        let column_list = cache
            .entry(table_batch.model.name().to_string())
            .or_insert_with(|| {
                let mut columns: Vec<&str> = table_batch
                    .model
                    .fields()
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect();
                columns.push("etl_row_hash");
                columns.join(", ")
            })
            .clone();
        format!(
            "INSERT INTO {} ({}) ",
            table_batch.model.stage_table_name(),
            column_list
        )
    }

    async fn write_batch(&self, table_batch: &TableBatch) -> Result<(), SluiceError> {
        if table_batch.records.is_empty() {
            return Ok(());
        }
        let prefix = self.insert_prefix(table_batch);
        let fields = table_batch.model.fields();

        for chunk in table_batch.records.chunks(self.batch_size) {
            let converted: Vec<Record> =
                chunk.iter().map(|record| self.convert_record(record)).collect();

            let mut tx = self.pool.begin().await?;
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(prefix.as_str());
            builder.push_values(&converted, |mut row, record| {
                for field in fields {
                    bind_field(&mut row, field, record.values.get(&field.name));
                }
                row.push_bind(record.row_hash.to_vec());
            });
            builder.build().execute(&mut *tx).await?;
            tx.commit().await?;
            debug!(
                table = %table_batch.model.stage_table_name(),
                rows = converted.len(),
                "inserted stage sub-batch"
            );
        }
        Ok(())
    }
}

fn bind_field(
    row: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &str>,
    field: &FieldDef,
    value: Option<&Value>,
) {
    match field.field_type {
        FieldType::BigInt => {
            row.push_bind(value.and_then(Value::as_i64));
        }
        FieldType::Double => {
            row.push_bind(value.and_then(Value::as_f64));
        }
        FieldType::Text => {
            row.push_bind(value.and_then(|v| v.as_str().map(ToString::to_string)));
        }
        FieldType::Boolean => {
            row.push_bind(value.and_then(Value::as_bool));
        }
        FieldType::Timestamp => {
            let parsed = value
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            row.push_bind(parsed);
        }
        FieldType::Date => {
            let parsed = value
                .and_then(|v| v.as_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            row.push_bind(parsed);
        }
        FieldType::Json => {
            row.push_bind(value.cloned());
        }
    }
}

#[async_trait]
impl StageWriter for PostgresWriter {
    async fn write(&self, table_batches: &[TableBatch]) -> Result<(), SluiceError> {
        for table_batch in table_batches {
            self.write_batch(table_batch).await?;
        }
        Ok(())
    }
}
