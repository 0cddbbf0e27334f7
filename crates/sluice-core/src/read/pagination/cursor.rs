//! Cursor pagination: sequential, next token extracted from each page.

use std::sync::Arc;

use serde_json::Value;
use sluice_error::SluiceError;
use tracing::{debug, info};

use crate::client::HttpClient;
use crate::read::entrypoint::extract_items;
use crate::read::pagination::fetch_page;
use crate::read::ApiRequest;
use crate::source::{ApiEndpointConfig, CursorPagination};
use crate::watermark::Watermarks;

/// Sequential cursor walk. The next token is extracted from each page by
/// `next_cursor_key`, a dotted path with optional array segments
/// (`data[-1].id`). Incremental runs probe the stored watermark first and
/// resume from the token it yields.
pub struct CursorPaginator {
    source_name: String,
    endpoint_name: String,
    config: CursorPagination,
    request: ApiRequest,
    client: Arc<HttpClient>,
    watermarks: Arc<dyn Watermarks>,
    entrypoint: Option<String>,
    backoff_starting_delay: f64,
    incremental: bool,
    /// Token used for the most recent fetch; becomes the attempted
    /// watermark at the end of the run.
    cursor: Option<String>,
    started: bool,
    pending_finish: bool,
    finished: bool,
    watermark_written: bool,
}

impl CursorPaginator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source_name: &str,
        endpoint_name: &str,
        config: CursorPagination,
        request: ApiRequest,
        client: Arc<HttpClient>,
        watermarks: Arc<dyn Watermarks>,
        entrypoint: Option<String>,
        endpoint_config: &ApiEndpointConfig,
    ) -> Self {
        Self {
            source_name: source_name.to_string(),
            endpoint_name: endpoint_name.to_string(),
            config,
            request,
            client,
            watermarks,
            entrypoint,
            backoff_starting_delay: endpoint_config.backoff_starting_delay,
            incremental: endpoint_config.incremental,
            cursor: None,
            started: false,
            pending_finish: false,
            finished: false,
            watermark_written: false,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, SluiceError> {
        loop {
            if self.finished {
                self.write_watermark().await?;
                return Ok(None);
            }
            if self.pending_finish {
                self.finished = true;
                continue;
            }
            if !self.started {
                self.started = true;
                if self.incremental && !self.resume_from_watermark().await? {
                    self.finished = true;
                    continue;
                }
            }

            let Some(body) = self.fetch_cursor(self.cursor.as_deref()).await? else {
                self.finished = true;
                continue;
            };
            let items = extract_items(&body, self.entrypoint.as_deref())?;
            if items.is_empty() {
                self.finished = true;
                continue;
            }
            match extract_next_value(&body, &self.config.next_cursor_key) {
                Some(next) => {
                    debug!(next_cursor = %next, "using next_cursor from response");
                    self.cursor = Some(next);
                }
                None => {
                    debug!(cursor = ?self.cursor, "no next_cursor found in response - stopping pagination");
                    self.pending_finish = true;
                }
            }
            return Ok(Some(items));
        }
    }

    /// Probe the page at the stored watermark and pick up its next token.
    /// Returns false when there is nothing new to read.
    async fn resume_from_watermark(&mut self) -> Result<bool, SluiceError> {
        let Some(watermark) = self
            .watermarks
            .get(&self.source_name, &self.endpoint_name)
            .await?
        else {
            return Ok(true);
        };
        info!(watermark = %watermark, "using watermark to get next cursor");
        let Some(body) = self.fetch_cursor(Some(&watermark)).await? else {
            return Ok(false);
        };
        match extract_next_value(&body, &self.config.next_cursor_key) {
            Some(next) => {
                self.cursor = Some(next);
                Ok(true)
            }
            None => {
                debug!(watermark = %watermark, "no new data starting from watermark - stopping pagination");
                Ok(false)
            }
        }
    }

    async fn write_watermark(&mut self) -> Result<(), SluiceError> {
        if self.watermark_written {
            return Ok(());
        }
        self.watermark_written = true;
        if self.incremental {
            if let Some(cursor) = &self.cursor {
                self.watermarks
                    .set_attempted(&self.source_name, &self.endpoint_name, cursor)
                    .await?;
            }
        }
        Ok(())
    }

    async fn fetch_cursor(&self, cursor: Option<&str>) -> Result<Option<Value>, SluiceError> {
        let mut params = self.request.params.clone();
        let token = cursor
            .map(ToString::to_string)
            .or_else(|| self.config.initial_value.clone());
        if let Some(token) = token {
            if !token.is_empty() {
                params.push((self.config.cursor_param.clone(), token));
            }
        }
        params.push((self.config.limit_param.clone(), self.config.limit.to_string()));
        debug!(url = %self.request.url, cursor = ?cursor, "fetching paginated page");
        fetch_page(
            &self.client,
            self.request.url.as_str(),
            self.backoff_starting_delay,
            &self.request.headers,
            &params,
        )
        .await
    }
}

/// Extract the next page token from a response body.
///
/// Supports key paths with array indexing (`data[-1].id`). Accepts string
/// or integer tokens; anything else means "no next page".
fn extract_next_value(data: &Value, key: &str) -> Option<String> {
    let mut current = data;
    for part in key.split('.') {
        current = step(current, part)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve one path part (key or array index like `data[-1]`).
fn step<'a>(current: &'a Value, part: &str) -> Option<&'a Value> {
    if let Some((key_part, index_part)) = part.split_once('[') {
        let index_part = index_part.strip_suffix(']')?;
        let array = current.get(key_part)?.as_array()?;
        if index_part == "-1" {
            array.last()
        } else {
            array.get(index_part.parse::<usize>().ok()?)
        }
    } else {
        current.get(part)
    }
}
