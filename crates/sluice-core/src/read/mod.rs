//! Readers: request assembly, pagination driving, and re-batching.
//!
//! A reader builds the initial request for an endpoint (base URL ⊕ merged
//! params ⊕ default headers ⊕ auth), then either drives the source's
//! pagination strategy — accumulating items and yielding fixed-size
//! batches — or issues a single request and yields its items as one
//! batch. REST endpoints use GET; GraphQL endpoints POST a JSON body
//! carrying `query` and `variables`.

mod auth;
pub mod entrypoint;
pub mod pagination;

use std::collections::VecDeque;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde_json::Value;
use sluice_error::{ConfigError, HttpError, SluiceError};
use sqlx::PgPool;

use crate::client::HttpClient;
use crate::source::{ApiConfig, ApiEndpointConfig, TransportKind};
use crate::watermark::Watermarks;

use auth::apply_auth;
use entrypoint::{extract_items, resolve_entrypoint};
use pagination::Paginator;

/// An assembled request: URL without query, headers, and query params.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub params: Vec<(String, String)>,
}

impl ApiRequest {
    /// The URL with query params attached, for strategies that follow
    /// absolute URLs.
    pub fn full_url(&self) -> String {
        if self.params.is_empty() {
            return self.url.to_string();
        }
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .extend_pairs(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        url.to_string()
    }
}

/// Reader for one endpoint.
pub struct Reader {
    source: Arc<ApiConfig>,
    endpoint_name: String,
    client: Arc<HttpClient>,
    watermarks: Arc<dyn Watermarks>,
    pool: Option<PgPool>,
    batch_size: usize,
}

impl Reader {
    pub fn new(
        source: Arc<ApiConfig>,
        endpoint_name: &str,
        client: Arc<HttpClient>,
        watermarks: Arc<dyn Watermarks>,
        pool: Option<PgPool>,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            endpoint_name: endpoint_name.to_string(),
            client,
            watermarks,
            pool,
            batch_size: batch_size.max(1),
        }
    }

    /// Open a batch stream for the endpoint. All I/O happens lazily as
    /// the stream is pulled.
    pub fn read(
        &self,
        url: &str,
        endpoint_config: &ApiEndpointConfig,
    ) -> Result<BatchStream, SluiceError> {
        let request = build_request(&self.source, url, endpoint_config)?;

        let paginator = Paginator::for_source(
            &self.source,
            &self.endpoint_name,
            endpoint_config,
            request.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.watermarks),
            self.pool.clone(),
        )?;

        match paginator {
            Some(paginator) => Ok(BatchStream::paginated(paginator, self.batch_size)),
            None => Ok(BatchStream::single(SingleFetch {
                client: Arc::clone(&self.client),
                transport: self.source.transport,
                request,
                body: endpoint_config.body.clone(),
                entrypoint: resolve_entrypoint(&self.source, endpoint_config),
                backoff_starting_delay: endpoint_config.backoff_starting_delay,
            })),
        }
    }
}

/// Build the initial request for an endpoint.
fn build_request(
    source: &ApiConfig,
    url: &str,
    endpoint_config: &ApiEndpointConfig,
) -> Result<ApiRequest, SluiceError> {
    let url = Url::parse(url).map_err(|e| HttpError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    // Endpoint params override source-level defaults.
    let mut merged = source.default_params.clone();
    for (key, value) in &endpoint_config.params {
        merged.insert(key.clone(), value.clone());
    }
    let params = merged.into_iter().collect();

    let mut headers = HeaderMap::new();
    for (name, value) in &source.default_headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| ConfigError::InvalidHeader {
                source_name: source.name.clone(),
                name: name.clone(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader {
                source_name: source.name.clone(),
                name: name.clone(),
            })?;
        headers.insert(header_name, header_value);
    }

    if let Some(auth) = &source.authentication {
        apply_auth(auth, &source.name, &mut headers)?;
    }

    Ok(ApiRequest {
        url,
        headers,
        params,
    })
}

struct SingleFetch {
    client: Arc<HttpClient>,
    transport: TransportKind,
    request: ApiRequest,
    body: Option<Value>,
    entrypoint: Option<String>,
    backoff_starting_delay: f64,
}

enum BatchStreamInner {
    Single(Option<SingleFetch>),
    Paginated {
        paginator: Paginator,
        buffer: VecDeque<Value>,
        batch_size: usize,
        done: bool,
    },
}

/// Lazy sequence of item batches produced by a reader.
pub struct BatchStream {
    inner: BatchStreamInner,
}

impl BatchStream {
    fn single(fetch: SingleFetch) -> Self {
        Self {
            inner: BatchStreamInner::Single(Some(fetch)),
        }
    }

    fn paginated(paginator: Paginator, batch_size: usize) -> Self {
        Self {
            inner: BatchStreamInner::Paginated {
                paginator,
                buffer: VecDeque::new(),
                batch_size,
                done: false,
            },
        }
    }

    /// Pull the next batch; `None` when the endpoint is drained.
    ///
    /// Paginated endpoints emit full batches of `batch_size` items plus a
    /// final short batch; unpaginated endpoints emit a single batch.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Value>>, SluiceError> {
        match &mut self.inner {
            BatchStreamInner::Single(fetch) => {
                let Some(fetch) = fetch.take() else {
                    return Ok(None);
                };
                let body = match fetch.transport {
                    TransportKind::Rest => {
                        fetch
                            .client
                            .get(
                                fetch.request.url.as_str(),
                                fetch.backoff_starting_delay,
                                Some(&fetch.request.headers),
                                &fetch.request.params,
                            )
                            .await?
                    }
                    TransportKind::GraphQl => {
                        let body = fetch
                            .body
                            .clone()
                            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                        fetch
                            .client
                            .post(
                                fetch.request.url.as_str(),
                                fetch.backoff_starting_delay,
                                Some(&fetch.request.headers),
                                &fetch.request.params,
                                Some(&body),
                            )
                            .await?
                    }
                };
                let items = extract_items(&body, fetch.entrypoint.as_deref())?;
                Ok(Some(items))
            }
            BatchStreamInner::Paginated {
                paginator,
                buffer,
                batch_size,
                done,
            } => loop {
                if buffer.len() >= *batch_size {
                    return Ok(Some(buffer.drain(..*batch_size).collect()));
                }
                if *done {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(buffer.drain(..).collect()));
                }
                match paginator.next_page().await? {
                    Some(items) => buffer.extend(items),
                    None => *done = true,
                }
            },
        }
    }
}
