//! PostgreSQL auditor.

use async_trait::async_trait;
use sluice_error::{PipelineError, SluiceError};
use sqlx::{Column, PgPool, Row};
use tracing::error;

use crate::audit::Auditor;
use crate::db::retry_db;
use crate::source::{ApiEndpointConfig, TableConfig};

pub struct PostgresAuditor {
    pool: PgPool,
    tables: Vec<TableConfig>,
}

impl PostgresAuditor {
    pub fn new(pool: PgPool, endpoint_config: &ApiEndpointConfig) -> Self {
        Self {
            pool,
            tables: endpoint_config.tables.clone(),
        }
    }

    /// `grain_unique` is 1 iff the distinct PK tuple count matches the
    /// row count.
    fn grain_validation_sql(primary_keys: &[&str], stage_table_name: &str) -> String {
        let grain = if primary_keys.len() == 1 {
            primary_keys[0].to_string()
        } else {
            format!("({})", primary_keys.join(", "))
        };
        format!(
            "SELECT CASE WHEN COUNT(DISTINCT {grain}) = COUNT(*) THEN 1 ELSE 0 END \
             AS grain_unique FROM {stage_table_name}"
        )
    }

    async fn audit_one_grain(&self, table: &TableConfig) -> Result<(), SluiceError> {
        let stage_table_name = table.model.stage_table_name();
        let sql = Self::grain_validation_sql(&table.model.primary_keys(), &stage_table_name);
        let unique: i32 = retry_db(|| async {
            let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
            row.try_get::<i32, _>("grain_unique")
        })
        .await?;
        if unique == 0 {
            error!(table = %stage_table_name, "grain is not unique");
            return Err(PipelineError::GrainValidation {
                table: stage_table_name,
            }
            .into());
        }
        Ok(())
    }

    async fn audit_one_data(&self, table: &TableConfig, audit_sql: &str) -> Result<(), SluiceError> {
        let stage_table_name = table.model.stage_table_name();
        let sql = audit_sql.replace("{table}", &stage_table_name);
        let failed: Vec<String> = retry_db(|| async {
            let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
            let mut failed = Vec::new();
            for (index, column) in row.columns().iter().enumerate() {
                if audit_flag(&row, index) == 0 {
                    failed.push(column.name().to_string());
                }
            }
            Ok(failed)
        })
        .await?;
        if !failed.is_empty() {
            let audits = failed.join(", ");
            error!(table = %stage_table_name, audits = %audits, "audits failed");
            return Err(PipelineError::AuditFailed {
                table: stage_table_name,
                audits,
            }
            .into());
        }
        Ok(())
    }
}

/// Audit columns may come back as any integer width or a boolean.
fn audit_flag(row: &sqlx::postgres::PgRow, index: usize) -> i64 {
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return v;
    }
    if let Ok(v) = row.try_get::<i32, _>(index) {
        return i64::from(v);
    }
    if let Ok(v) = row.try_get::<i16, _>(index) {
        return i64::from(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return i64::from(v);
    }
    0
}

#[async_trait]
impl Auditor for PostgresAuditor {
    async fn audit_grain(&self) -> Result<(), SluiceError> {
        for table in &self.tables {
            self.audit_one_grain(table).await?;
        }
        Ok(())
    }

    async fn audit_data(&self) -> Result<(), SluiceError> {
        for table in &self.tables {
            if let Some(audit_sql) = &table.audit_query {
                self.audit_one_data(table, audit_sql).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_key_grain_sql() {
        let sql = PostgresAuditor::grain_validation_sql(&["id"], "stage_widgets");
        assert_eq!(
            sql,
            "SELECT CASE WHEN COUNT(DISTINCT id) = COUNT(*) THEN 1 ELSE 0 END \
             AS grain_unique FROM stage_widgets"
        );
    }

    #[test]
    fn composite_key_grain_sql() {
        let sql =
            PostgresAuditor::grain_validation_sql(&["invoice_id", "line_item_id"], "stage_lines");
        assert!(sql.contains("COUNT(DISTINCT (invoice_id, line_item_id))"));
    }
}
