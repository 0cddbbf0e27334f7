//! Database pool construction and the transient-error retry wrapper.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::warn;

use crate::settings::Settings;

const DB_RETRY_ATTEMPTS: u32 = 3;
const DB_RETRY_BASE_DELAY_MS: u64 = 250;

/// Connect a pool from the settings' connection parts and verify it with
/// a round-trip query.
pub async fn connect_pool(settings: &Settings) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::new()
        .host(&settings.db_host)
        .port(settings.db_port)
        .username(&settings.db_username)
        .password(&settings.db_password)
        .database(&settings.db_database);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    // Test connection
    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    Ok(pool)
}

/// Whether a database error is worth retrying.
pub fn is_transient_db_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
    )
}

/// Retry a database operation on transient errors with exponential
/// backoff. Non-transient errors surface immediately.
pub async fn retry_db<T, F, Fut>(mut operation: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if attempt >= DB_RETRY_ATTEMPTS || !is_transient_db_error(&error) {
                    return Err(error);
                }
                let delay = Duration::from_millis(DB_RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1));
                warn!(
                    attempt,
                    max_attempts = DB_RETRY_ATTEMPTS,
                    "transient database error ({error}), retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Run a query and render every row as column-name → string.
///
/// Used by query-driven pagination, where arbitrary user SQL feeds URL
/// templates; values only ever travel onward as strings.
pub async fn fetch_rows_as_strings(
    pool: &PgPool,
    sql: &str,
) -> Result<Vec<IndexMap<String, String>>, sqlx::Error> {
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_strings).collect())
}

fn row_to_strings(row: &PgRow) -> IndexMap<String, String> {
    use sqlx::Column;
    let mut out = IndexMap::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), column_to_string(row, index));
    }
    out
}

fn column_to_string(row: &PgRow, index: usize) -> String {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(|v| v.to_string()).unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return value.map(|v| v.to_string()).unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map(|v| v.to_string()).unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.map(|v| v.to_string()).unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return value.map(|v| v.to_rfc3339()).unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<NaiveDate>, _>(index) {
        return value.map(|v| v.to_string()).unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<serde_json::Value>, _>(index) {
        return value.map(|v| v.to_string()).unwrap_or_default();
    }
    String::new()
}
