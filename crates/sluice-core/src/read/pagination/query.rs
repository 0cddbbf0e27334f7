//! Query-driven pagination: rows from the pipeline's own database drive
//! the requests.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde_json::Value;
use sluice_error::{HttpError, SluiceError};
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::client::HttpClient;
use crate::db::fetch_rows_as_strings;
use crate::read::entrypoint::extract_items;
use crate::read::ApiRequest;
use crate::source::{ApiEndpointConfig, QueryPagination, ValueIn};

/// Executes the configured SQL once, then issues one GET per result row,
/// chunked by `max_concurrent`. With `value_in = path` the endpoint key
/// is a path template (`{field}` placeholders); with `value_in = params`
/// the row lands in the query string. No watermark.
pub struct QueryPaginator {
    endpoint_name: String,
    config: QueryPagination,
    base_url: String,
    headers: HeaderMap,
    client: Arc<HttpClient>,
    pool: PgPool,
    entrypoint: Option<String>,
    backoff_starting_delay: f64,
    semaphore: Arc<Semaphore>,
    chunks: Option<VecDeque<Vec<IndexMap<String, String>>>>,
}

impl QueryPaginator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        endpoint_name: &str,
        config: QueryPagination,
        request: &ApiRequest,
        client: Arc<HttpClient>,
        pool: PgPool,
        entrypoint: Option<String>,
        endpoint_config: &ApiEndpointConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            endpoint_name: endpoint_name.to_string(),
            config,
            base_url: request.url.to_string(),
            headers: request.headers.clone(),
            client,
            pool,
            entrypoint,
            backoff_starting_delay: endpoint_config.backoff_starting_delay,
            semaphore,
            chunks: None,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, SluiceError> {
        if self.chunks.is_none() {
            self.run_query().await?;
        }
        let Some(chunk) = self.chunks.as_mut().and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        let fetches: Vec<_> = chunk.iter().map(|row| self.fetch_row(row)).collect();
        let responses = join_all(fetches).await;

        let mut items = Vec::new();
        for response in responses {
            items.extend(extract_items(&response?, self.entrypoint.as_deref())?);
        }
        Ok(Some(items))
    }

    async fn run_query(&mut self) -> Result<(), SluiceError> {
        let rows = fetch_rows_as_strings(&self.pool, &self.config.query).await?;
        if rows.is_empty() {
            warn!("query pagination returned no rows");
        } else {
            info!(
                rows = rows.len(),
                max_concurrent = self.config.max_concurrent,
                "query pagination"
            );
        }
        let chunks = rows
            .chunks(self.config.max_concurrent.max(1))
            .map(<[IndexMap<String, String>]>::to_vec)
            .collect();
        self.chunks = Some(chunks);
        Ok(())
    }

    async fn fetch_row(&self, row: &IndexMap<String, String>) -> Result<Value, SluiceError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SluiceError::Internal {
                message: "pagination semaphore closed".to_string(),
            })?;
        let url = self.url_for_row(row)?;
        self.client
            .get(&url, self.backoff_starting_delay, Some(&self.headers), &[])
            .await
            .map_err(Into::into)
    }

    fn url_for_row(&self, row: &IndexMap<String, String>) -> Result<String, HttpError> {
        match self.config.value_in {
            ValueIn::Path => {
                let path = substitute(&self.endpoint_name, row);
                let base_dir = if self.base_url.ends_with('/') {
                    self.base_url.clone()
                } else {
                    format!("{}/", self.base_url)
                };
                let joined = Url::parse(&base_dir)
                    .and_then(|base| base.join(&path))
                    .map_err(|e| HttpError::Transport {
                        url: self.base_url.clone(),
                        message: e.to_string(),
                    })?;
                Ok(joined.to_string())
            }
            ValueIn::Params => match &self.config.params {
                Some(template) => Ok(format!("{}?{}", self.base_url, substitute(template, row))),
                None => {
                    let mut url =
                        Url::parse(&self.base_url).map_err(|e| HttpError::Transport {
                            url: self.base_url.clone(),
                            message: e.to_string(),
                        })?;
                    url.query_pairs_mut().extend_pairs(row.iter());
                    Ok(url.to_string())
                }
            },
        }
    }
}

/// Replace `{field}` placeholders with row values.
fn substitute(template: &str, row: &IndexMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in row {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
