//! Pluggable pagination strategies.
//!
//! Every strategy exposes the same pull contract: `next_page()` yields
//! the next page's items (already run through the configured JSON
//! entrypoint) or `None` when pagination is over. A 400 from a page
//! fetch is the expected terminal signal for out-of-range cursors and
//! offsets and stops pagination silently; other statuses surface.
//!
//! Incremental strategies record a best-effort cursor through the
//! [`Watermarks`] store as they finish; the runner commits it only after
//! a successful publish.

mod cursor;
mod next_url;
mod offset;
mod query;

use std::sync::Arc;

use reqwest::header::HeaderMap;
use serde_json::Value;
use sluice_error::SluiceError;
use sqlx::PgPool;
use tracing::debug;

use crate::client::HttpClient;
use crate::read::entrypoint::resolve_entrypoint;
use crate::read::ApiRequest;
use crate::source::{ApiConfig, ApiEndpointConfig, PaginationConfig};
use crate::watermark::Watermarks;

pub use cursor::CursorPaginator;
pub use next_url::NextUrlPaginator;
pub use offset::OffsetPaginator;
pub use query::QueryPaginator;

/// A configured pagination strategy with its in-flight state.
pub enum Paginator {
    Offset(OffsetPaginator),
    Cursor(CursorPaginator),
    NextUrl(NextUrlPaginator),
    Query(QueryPaginator),
}

impl Paginator {
    /// Build the paginator declared by the source, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn for_source(
        source: &Arc<ApiConfig>,
        endpoint_name: &str,
        endpoint_config: &ApiEndpointConfig,
        request: ApiRequest,
        client: Arc<HttpClient>,
        watermarks: Arc<dyn Watermarks>,
        pool: Option<PgPool>,
    ) -> Result<Option<Self>, SluiceError> {
        let Some(pagination) = &source.pagination else {
            return Ok(None);
        };
        let entrypoint = resolve_entrypoint(source, endpoint_config);
        let paginator = match pagination.clone() {
            PaginationConfig::Offset(config) => Self::Offset(OffsetPaginator::new(
                &source.name,
                endpoint_name,
                config,
                request,
                client,
                watermarks,
                entrypoint,
                endpoint_config,
            )),
            PaginationConfig::Cursor(config) => Self::Cursor(CursorPaginator::new(
                &source.name,
                endpoint_name,
                config,
                request,
                client,
                watermarks,
                entrypoint,
                endpoint_config,
            )),
            PaginationConfig::NextUrl(config) => Self::NextUrl(NextUrlPaginator::new(
                &source.name,
                endpoint_name,
                config,
                &request,
                client,
                watermarks,
                entrypoint,
                endpoint_config,
            )),
            PaginationConfig::Query(config) => {
                let pool = pool.ok_or_else(|| SluiceError::Internal {
                    message: "query pagination requires a database pool".to_string(),
                })?;
                Self::Query(QueryPaginator::new(
                    endpoint_name,
                    config,
                    &request,
                    client,
                    pool,
                    entrypoint,
                    endpoint_config,
                ))
            }
        };
        Ok(Some(paginator))
    }

    /// Next page of items, or `None` when pagination is complete.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, SluiceError> {
        match self {
            Self::Offset(p) => p.next_page().await,
            Self::Cursor(p) => p.next_page().await,
            Self::NextUrl(p) => p.next_page().await,
            Self::Query(p) => p.next_page().await,
        }
    }
}

/// Fetch one page, treating a 400 as the end of pagination.
pub(crate) async fn fetch_page(
    client: &HttpClient,
    url: &str,
    backoff_starting_delay: f64,
    headers: &HeaderMap,
    params: &[(String, String)],
) -> Result<Option<Value>, SluiceError> {
    match client.get(url, backoff_starting_delay, Some(headers), params).await {
        Ok(body) => Ok(Some(body)),
        Err(error) if error.status() == Some(400) => {
            debug!(url, "400 Bad Request - stopping pagination");
            Ok(None)
        }
        Err(error) => Err(error.into()),
    }
}
