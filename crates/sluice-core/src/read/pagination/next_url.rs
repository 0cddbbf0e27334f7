//! Next-URL pagination: each page links to the next one.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use serde_json::Value;
use sluice_error::SluiceError;
use tracing::{debug, info, warn};

use crate::client::HttpClient;
use crate::read::entrypoint::extract_items;
use crate::read::pagination::fetch_page;
use crate::read::ApiRequest;
use crate::source::{ApiEndpointConfig, NextUrlPagination};
use crate::watermark::Watermarks;

/// Sequential walk along `next_url` links. When the link disappears the
/// current URL becomes the attempted watermark: it is the page an
/// incremental run re-requests to pick up where this one stopped.
pub struct NextUrlPaginator {
    source_name: String,
    endpoint_name: String,
    config: NextUrlPagination,
    headers: HeaderMap,
    initial_url: String,
    client: Arc<HttpClient>,
    watermarks: Arc<dyn Watermarks>,
    entrypoint: Option<String>,
    backoff_starting_delay: f64,
    incremental: bool,
    current_url: Option<String>,
    started: bool,
    pending_finish: bool,
    finished: bool,
}

impl NextUrlPaginator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source_name: &str,
        endpoint_name: &str,
        config: NextUrlPagination,
        request: &ApiRequest,
        client: Arc<HttpClient>,
        watermarks: Arc<dyn Watermarks>,
        entrypoint: Option<String>,
        endpoint_config: &ApiEndpointConfig,
    ) -> Self {
        Self {
            source_name: source_name.to_string(),
            endpoint_name: endpoint_name.to_string(),
            config,
            headers: request.headers.clone(),
            initial_url: request.full_url(),
            client,
            watermarks,
            entrypoint,
            backoff_starting_delay: endpoint_config.backoff_starting_delay,
            incremental: endpoint_config.incremental,
            current_url: None,
            started: false,
            pending_finish: false,
            finished: false,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, SluiceError> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.pending_finish {
                self.finished = true;
                continue;
            }
            if !self.started {
                self.started = true;
                self.current_url = Some(self.initial_url.clone());
                if self.incremental && !self.resume_from_watermark().await? {
                    self.finished = true;
                    continue;
                }
            }

            let Some(url) = self.current_url.clone() else {
                self.finished = true;
                continue;
            };
            let Some(body) = self.fetch_url(&url).await? else {
                self.finished = true;
                continue;
            };
            let items = extract_items(&body, self.entrypoint.as_deref())?;
            if items.is_empty() {
                self.finished = true;
                continue;
            }
            match get_nested_url(&body, &self.config.next_url_key) {
                Some(next) => {
                    debug!(next_url = %next, "using next_url from response");
                    self.current_url = Some(next);
                }
                None => {
                    debug!(url = %url, "no next_url found in response - stopping pagination");
                    if self.incremental {
                        self.watermarks
                            .set_attempted(&self.source_name, &self.endpoint_name, &url)
                            .await?;
                    }
                    self.pending_finish = true;
                }
            }
            return Ok(Some(items));
        }
    }

    /// Re-request the watermark URL and continue from the link it holds.
    /// Returns false when the watermark page still has no next link.
    async fn resume_from_watermark(&mut self) -> Result<bool, SluiceError> {
        let Some(watermark) = self
            .watermarks
            .get(&self.source_name, &self.endpoint_name)
            .await?
        else {
            return Ok(true);
        };
        info!(watermark = %watermark, "using watermark to get next URL");
        let Some(body) = self.fetch_url(&watermark).await? else {
            return Ok(false);
        };
        match get_nested_url(&body, &self.config.next_url_key) {
            Some(next) => {
                self.current_url = Some(next);
                Ok(true)
            }
            None => {
                warn!(watermark = %watermark, "no new data starting from watermark - stopping pagination");
                Ok(false)
            }
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<Option<Value>, SluiceError> {
        debug!(url, "fetching paginated page");
        fetch_page(
            &self.client,
            url,
            self.backoff_starting_delay,
            &self.headers,
            &[],
        )
        .await
    }
}

/// Dotted traversal to a string-valued next URL.
fn get_nested_url(data: &Value, key: &str) -> Option<String> {
    let mut current = data;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    current.as_str().map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_next_url() {
        let body = json!({"info": {"next": "https://api.example.com/items?page=2"}});
        assert_eq!(
            get_nested_url(&body, "info.next"),
            Some("https://api.example.com/items?page=2".to_string())
        );
    }

    #[test]
    fn non_string_next_url_is_none() {
        let body = json!({"info": {"next": null}});
        assert_eq!(get_nested_url(&body, "info.next"), None);
        let body = json!({"info": {}});
        assert_eq!(get_nested_url(&body, "info.next"), None);
    }
}
