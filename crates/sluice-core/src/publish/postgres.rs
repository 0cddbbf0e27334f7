//! PostgreSQL publisher: a single MERGE per target table.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sluice_error::SluiceError;
use sqlx::PgPool;
use tracing::info;

use crate::db::retry_db;
use crate::model::DataModel;
use crate::publish::Publisher;
use crate::source::{ApiEndpointConfig, TableConfig};

pub struct PostgresPublisher {
    pool: PgPool,
    tables: Vec<TableConfig>,
}

impl PostgresPublisher {
    pub fn new(pool: PgPool, endpoint_config: &ApiEndpointConfig) -> Self {
        Self {
            pool,
            tables: endpoint_config.tables.clone(),
        }
    }

    /// MERGE with hash-guarded update: matched rows update only when the
    /// stage hash differs; new rows insert with `etl_created_at`.
    fn merge_sql(model: &DataModel, now_iso: &str) -> String {
        let stage_table_name = model.stage_table_name();
        let target_table_name = model.target_table_name();
        let primary_keys = model.primary_keys();

        let mut columns: Vec<&str> = model.fields().iter().map(|f| f.name.as_str()).collect();
        columns.push("etl_row_hash");

        let join_condition = primary_keys
            .iter()
            .map(|pk| format!("stage.{pk} = target.{pk}"))
            .collect::<Vec<_>>()
            .join(" AND ");

        let insert_columns = {
            let mut cols = columns.clone();
            cols.push("etl_created_at");
            cols.join(", ")
        };
        let insert_values = columns
            .iter()
            .map(|col| format!("stage.{col}"))
            .chain(std::iter::once(format!("'{now_iso}'")))
            .collect::<Vec<_>>()
            .join(", ");

        let update_set = columns
            .iter()
            .filter(|col| !primary_keys.contains(col))
            .map(|col| format!("{col} = stage.{col}"))
            .chain(std::iter::once(format!("etl_updated_at = '{now_iso}'")))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "MERGE INTO {target_table_name} AS target \
             USING {stage_table_name} AS stage \
             ON {join_condition} \
             WHEN MATCHED AND stage.etl_row_hash != target.etl_row_hash THEN \
             UPDATE SET {update_set} \
             WHEN NOT MATCHED THEN \
             INSERT ({insert_columns}) VALUES ({insert_values})"
        )
    }

    async fn publish_table(&self, table: &TableConfig) -> Result<(), SluiceError> {
        let now_iso = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let sql = Self::merge_sql(&table.model, &now_iso);
        info!(
            stage = %table.model.stage_table_name(),
            target = %table.model.target_table_name(),
            "publishing stage data"
        );
        retry_db(|| async {
            sqlx::query(&sql).execute(&self.pool).await?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for PostgresPublisher {
    async fn publish(&self) -> Result<(), SluiceError> {
        for table in &self.tables {
            self.publish_table(table).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, FieldType};

    fn model() -> std::sync::Arc<DataModel> {
        DataModel::new(
            "InvoiceLineItem",
            vec![
                FieldDef::new("invoice_id", FieldType::BigInt, "root.invoice_id").primary_key(),
                FieldDef::new(
                    "line_item_id",
                    FieldType::BigInt,
                    "root.invoice_line_items[*].line_item_id",
                )
                .primary_key(),
                FieldDef::new(
                    "quantity",
                    FieldType::BigInt,
                    "root.invoice_line_items[*].quantity",
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn merge_sql_shape() {
        let sql = PostgresPublisher::merge_sql(&model(), "2024-01-01T00:00:00Z");
        assert!(sql.starts_with("MERGE INTO invoice_line_item AS target"));
        assert!(sql.contains("USING stage_invoice_line_item AS stage"));
        assert!(sql.contains(
            "ON stage.invoice_id = target.invoice_id AND stage.line_item_id = target.line_item_id"
        ));
        assert!(sql.contains("WHEN MATCHED AND stage.etl_row_hash != target.etl_row_hash"));
        // Primary keys are never updated; bookkeeping moves with the row.
        assert!(sql.contains(
            "UPDATE SET quantity = stage.quantity, etl_row_hash = stage.etl_row_hash, \
             etl_updated_at = '2024-01-01T00:00:00Z'"
        ));
        assert!(sql.contains(
            "INSERT (invoice_id, line_item_id, quantity, etl_row_hash, etl_created_at)"
        ));
        assert!(sql.contains("VALUES (stage.invoice_id, stage.line_item_id, stage.quantity, \
             stage.etl_row_hash, '2024-01-01T00:00:00Z')"));
    }
}
