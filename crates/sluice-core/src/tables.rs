//! DDL management: production, stage, and watermark tables.
//!
//! Stage tables are ephemeral and recreated on every run. Target tables
//! are created on first run and evolved additively afterwards; columns
//! are never dropped. The dev profile fully resets target tables.

use std::collections::HashSet;

use sluice_error::SluiceError;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::db::retry_db;
use crate::model::{DataModel, FieldDef, FieldType};
use crate::settings::Settings;
use crate::source::ApiEndpointConfig;

const ETL_COLUMNS: [&str; 3] = ["etl_row_hash", "etl_created_at", "etl_updated_at"];

pub struct TableManager {
    pool: PgPool,
    drivername: String,
    dev_mode: bool,
}

impl TableManager {
    pub fn new(pool: PgPool, settings: &Settings) -> Self {
        Self {
            pool,
            drivername: settings.drivername.clone(),
            dev_mode: settings.is_dev(),
        }
    }

    /// Create (or evolve) the target table for every model.
    pub async fn create_production_tables(
        &self,
        endpoint_config: &ApiEndpointConfig,
    ) -> Result<(), SluiceError> {
        for table in &endpoint_config.tables {
            self.create_production_table(&table.model).await?;
        }
        Ok(())
    }

    async fn create_production_table(&self, model: &DataModel) -> Result<(), SluiceError> {
        let table_name = model.target_table_name();
        if self.dev_mode {
            self.execute(&format!("DROP TABLE IF EXISTS {table_name}")).await?;
        }

        let mut columns: Vec<String> = model.fields().iter().map(column_sql).collect();
        columns.push("etl_row_hash BYTEA NOT NULL".to_string());
        columns.push("etl_created_at TIMESTAMPTZ NOT NULL".to_string());
        columns.push("etl_updated_at TIMESTAMPTZ NULL".to_string());
        columns.push(format!("PRIMARY KEY ({})", model.primary_keys().join(", ")));

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table_name} ({})",
            columns.join(", ")
        );
        self.execute(&sql).await?;

        if !self.dev_mode {
            self.evolve_table_schema(model).await?;
        }
        Ok(())
    }

    /// Drop and recreate every stage table for the endpoint.
    pub async fn create_stage_tables(
        &self,
        endpoint_config: &ApiEndpointConfig,
    ) -> Result<(), SluiceError> {
        info!(
            tables = endpoint_config.tables.len(),
            "creating stage tables"
        );
        for table in &endpoint_config.tables {
            let stage_table_name = table.model.stage_table_name();
            self.execute(&format!("DROP TABLE IF EXISTS {stage_table_name}"))
                .await?;
            let mut columns: Vec<String> = table.model.fields().iter().map(column_sql).collect();
            columns.push("etl_row_hash BYTEA NOT NULL".to_string());
            let sql = format!(
                "CREATE TABLE {stage_table_name} ({})",
                columns.join(", ")
            );
            debug!(table = %stage_table_name, "creating stage table");
            self.execute(&sql).await?;
        }
        Ok(())
    }

    /// End-of-run cleanup.
    pub async fn drop_stage_tables(
        &self,
        endpoint_config: &ApiEndpointConfig,
    ) -> Result<(), SluiceError> {
        info!(
            tables = endpoint_config.tables.len(),
            "dropping stage tables"
        );
        for table in &endpoint_config.tables {
            let stage_table_name = table.model.stage_table_name();
            self.execute(&format!("DROP TABLE IF EXISTS {stage_table_name}"))
                .await?;
            debug!(table = %stage_table_name, "dropped stage table");
        }
        Ok(())
    }

    /// One-time, idempotent.
    pub async fn create_watermark_table(&self) -> Result<(), SluiceError> {
        let sql = "CREATE TABLE IF NOT EXISTS api_watermark (\
                   source_name VARCHAR(255) NOT NULL, \
                   endpoint_name VARCHAR(255) NOT NULL, \
                   watermark_value VARCHAR(255) NULL, \
                   watermark_attempted VARCHAR(255) NULL, \
                   etl_created_at TIMESTAMPTZ NOT NULL, \
                   etl_updated_at TIMESTAMPTZ NULL, \
                   PRIMARY KEY (source_name, endpoint_name))";
        self.execute(sql).await
    }

    /// Additively add model columns missing from the target table.
    pub async fn evolve_table_schema(&self, model: &DataModel) -> Result<(), SluiceError> {
        let target_table_name = model.target_table_name();
        let existing: HashSet<String> = retry_db(|| async {
            let rows = sqlx::query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_name = $1 AND table_schema = current_schema()",
            )
            .bind(&target_table_name)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .iter()
                .filter_map(|row| row.try_get::<String, _>("column_name").ok())
                .collect())
        })
        .await?;

        let target_columns: HashSet<&str> = existing
            .iter()
            .map(String::as_str)
            .filter(|name| !ETL_COLUMNS.contains(name))
            .collect();

        let missing: Vec<&FieldDef> = model
            .fields()
            .iter()
            .filter(|field| !target_columns.contains(field.name.as_str()))
            .collect();

        if missing.is_empty() {
            debug!(table = %target_table_name, "no schema evolution needed");
            return Ok(());
        }

        info!(
            table = %target_table_name,
            columns = %missing
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            "evolving schema"
        );

        let add_column_keyword = if self.drivername == "mssql" {
            "ADD"
        } else {
            "ADD COLUMN"
        };
        for field in missing {
            let sql = format!(
                "ALTER TABLE {target_table_name} {add_column_keyword} {}",
                column_sql(field)
            );
            self.execute(&sql).await?;
            debug!(table = %target_table_name, column = %field.name, "added column");
        }
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<(), SluiceError> {
        retry_db(|| async {
            sqlx::query(sql).execute(&self.pool).await?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}

fn column_sql(field: &FieldDef) -> String {
    let nullable = if field.nullable { "" } else { " NOT NULL" };
    format!("{} {}{nullable}", field.name, sql_type(field))
}

fn sql_type(field: &FieldDef) -> String {
    match field.field_type {
        FieldType::BigInt => "BIGINT".to_string(),
        FieldType::Double => "DOUBLE PRECISION".to_string(),
        FieldType::Text => match field.max_length {
            Some(max) => format!("VARCHAR({max})"),
            None => "TEXT".to_string(),
        },
        FieldType::Boolean => "BOOLEAN".to_string(),
        FieldType::Timestamp => "TIMESTAMPTZ".to_string(),
        FieldType::Date => "DATE".to_string(),
        FieldType::Json => "JSONB".to_string(),
    }
}
