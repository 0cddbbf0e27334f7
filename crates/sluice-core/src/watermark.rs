//! Two-phase per-endpoint cursor persistence.
//!
//! During a run, pagination records a best-effort cursor under
//! `watermark_attempted`. Only after a successful publish does the runner
//! promote it to `watermark_value` — the commit point. A run that fails
//! mid-flight leaves the committed value untouched, so the next run
//! resumes from the last known-good position (at-least-once delivery).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::retry_db;

/// Watermark persistence, keyed by `(source_name, endpoint_name)`.
#[async_trait]
pub trait Watermarks: Send + Sync {
    /// Last committed cursor, if any.
    async fn get(&self, source_name: &str, endpoint_name: &str) -> Result<Option<String>, sqlx::Error>;

    /// Upsert the attempted cursor for this run.
    async fn set_attempted(
        &self,
        source_name: &str,
        endpoint_name: &str,
        value: &str,
    ) -> Result<(), sqlx::Error>;

    /// Promote attempted → value. Called only after publish success.
    async fn commit(&self, source_name: &str, endpoint_name: &str) -> Result<(), sqlx::Error>;
}

/// Watermark store backed by the `api_watermark` table.
#[derive(Debug, Clone)]
pub struct SqlWatermarks {
    pool: PgPool,
}

impl SqlWatermarks {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Watermarks for SqlWatermarks {
    async fn get(&self, source_name: &str, endpoint_name: &str) -> Result<Option<String>, sqlx::Error> {
        info!(source = source_name, endpoint = endpoint_name, "getting watermark");
        let value = retry_db(|| async {
            let row: Option<(Option<String>,)> = sqlx::query_as(
                "SELECT watermark_value FROM api_watermark \
                 WHERE source_name = $1 AND endpoint_name = $2",
            )
            .bind(source_name)
            .bind(endpoint_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.and_then(|(v,)| v))
        })
        .await?;
        if value.is_none() {
            warn!(
                source = source_name,
                endpoint = endpoint_name,
                "no watermark value found"
            );
        }
        Ok(value)
    }

    async fn set_attempted(
        &self,
        source_name: &str,
        endpoint_name: &str,
        value: &str,
    ) -> Result<(), sqlx::Error> {
        retry_db(|| async {
            let now = Utc::now();
            let updated = sqlx::query(
                "UPDATE api_watermark \
                 SET watermark_attempted = $3, etl_updated_at = $4 \
                 WHERE source_name = $1 AND endpoint_name = $2",
            )
            .bind(source_name)
            .bind(endpoint_name)
            .bind(value)
            .bind(now)
            .execute(&self.pool)
            .await?;
            if updated.rows_affected() == 0 {
                sqlx::query(
                    "INSERT INTO api_watermark \
                     (source_name, endpoint_name, watermark_attempted, etl_created_at) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(source_name)
                .bind(endpoint_name)
                .bind(value)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            Ok(())
        })
        .await?;
        info!(
            source = source_name,
            endpoint = endpoint_name,
            value, "set watermark_attempted"
        );
        Ok(())
    }

    async fn commit(&self, source_name: &str, endpoint_name: &str) -> Result<(), sqlx::Error> {
        let committed = retry_db(|| async {
            let result = sqlx::query(
                "UPDATE api_watermark \
                 SET watermark_value = watermark_attempted, etl_updated_at = $3 \
                 WHERE source_name = $1 AND endpoint_name = $2 \
                 AND watermark_attempted IS NOT NULL",
            )
            .bind(source_name)
            .bind(endpoint_name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;
        if committed > 0 {
            info!(
                source = source_name,
                endpoint = endpoint_name,
                "committed watermark"
            );
        }
        Ok(())
    }
}

/// In-memory watermark store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryWatermarks {
    state: Mutex<HashMap<(String, String), WatermarkRow>>,
}

#[derive(Debug, Default, Clone)]
struct WatermarkRow {
    value: Option<String>,
    attempted: Option<String>,
}

impl MemoryWatermarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a committed value, as if a previous run had succeeded.
    pub fn seed(&self, source_name: &str, endpoint_name: &str, value: &str) {
        let mut state = self.state.lock().expect("watermark lock poisoned");
        state.insert(
            (source_name.to_string(), endpoint_name.to_string()),
            WatermarkRow {
                value: Some(value.to_string()),
                attempted: None,
            },
        );
    }

    /// The attempted (uncommitted) cursor, for assertions.
    pub fn attempted(&self, source_name: &str, endpoint_name: &str) -> Option<String> {
        let state = self.state.lock().expect("watermark lock poisoned");
        state
            .get(&(source_name.to_string(), endpoint_name.to_string()))
            .and_then(|row| row.attempted.clone())
    }
}

#[async_trait]
impl Watermarks for MemoryWatermarks {
    async fn get(&self, source_name: &str, endpoint_name: &str) -> Result<Option<String>, sqlx::Error> {
        let state = self.state.lock().expect("watermark lock poisoned");
        Ok(state
            .get(&(source_name.to_string(), endpoint_name.to_string()))
            .and_then(|row| row.value.clone()))
    }

    async fn set_attempted(
        &self,
        source_name: &str,
        endpoint_name: &str,
        value: &str,
    ) -> Result<(), sqlx::Error> {
        let mut state = self.state.lock().expect("watermark lock poisoned");
        state
            .entry((source_name.to_string(), endpoint_name.to_string()))
            .or_default()
            .attempted = Some(value.to_string());
        Ok(())
    }

    async fn commit(&self, source_name: &str, endpoint_name: &str) -> Result<(), sqlx::Error> {
        let mut state = self.state.lock().expect("watermark lock poisoned");
        if let Some(row) = state.get_mut(&(source_name.to_string(), endpoint_name.to_string())) {
            if row.attempted.is_some() {
                row.value = row.attempted.clone();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attempted_is_not_visible_until_commit() {
        let store = MemoryWatermarks::new();
        store.set_attempted("api", "items", "42").await.unwrap();
        assert_eq!(store.get("api", "items").await.unwrap(), None);
        store.commit("api", "items").await.unwrap();
        assert_eq!(store.get("api", "items").await.unwrap(), Some("42".to_string()));
    }

    #[tokio::test]
    async fn commit_without_attempted_is_a_no_op() {
        let store = MemoryWatermarks::new();
        store.seed("api", "items", "10");
        store.commit("api", "items").await.unwrap();
        assert_eq!(store.get("api", "items").await.unwrap(), Some("10".to_string()));
    }
}
