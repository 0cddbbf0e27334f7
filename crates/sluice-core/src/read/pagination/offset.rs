//! Offset pagination: parallel rounds of `max_concurrent` fetches.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use sluice_error::{PipelineError, SluiceError};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::client::HttpClient;
use crate::read::entrypoint::extract_items;
use crate::read::pagination::fetch_page;
use crate::read::ApiRequest;
use crate::source::{ApiEndpointConfig, OffsetPagination};
use crate::watermark::Watermarks;

/// Fires up to `max_concurrent` offset requests per round. A round ends
/// pagination when every response is empty, or after queueing its pages
/// when any page came back shorter than `limit`.
pub struct OffsetPaginator {
    source_name: String,
    endpoint_name: String,
    config: OffsetPagination,
    request: ApiRequest,
    client: Arc<HttpClient>,
    watermarks: Arc<dyn Watermarks>,
    entrypoint: Option<String>,
    backoff_starting_delay: f64,
    incremental: bool,
    semaphore: Arc<Semaphore>,
    buffer: VecDeque<Vec<Value>>,
    offset: i64,
    /// Highest `request_offset + len(items)` seen; becomes the attempted
    /// watermark so the next incremental run resumes past consumed rows.
    highest_next_offset: i64,
    started: bool,
    exhausted: bool,
    finished: bool,
}

impl OffsetPaginator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source_name: &str,
        endpoint_name: &str,
        config: OffsetPagination,
        request: ApiRequest,
        client: Arc<HttpClient>,
        watermarks: Arc<dyn Watermarks>,
        entrypoint: Option<String>,
        endpoint_config: &ApiEndpointConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let start_offset = config.start_offset;
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
            semaphore,
            buffer: VecDeque::new(),
            offset: start_offset,
            highest_next_offset: start_offset,
            started: false,
            exhausted: false,
            finished: false,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, SluiceError> {
        loop {
            if let Some(page) = self.buffer.pop_front() {
                return Ok(Some(page));
            }
            if self.finished {
                return Ok(None);
            }
            if self.exhausted {
                self.finish().await?;
                return Ok(None);
            }
            if !self.started {
                self.start().await?;
            }
            self.fetch_round().await?;
        }
    }

    async fn start(&mut self) -> Result<(), SluiceError> {
        self.started = true;
        if self.incremental {
            if let Some(watermark) = self
                .watermarks
                .get(&self.source_name, &self.endpoint_name)
                .await?
            {
                self.offset = watermark.parse().map_err(|_| PipelineError::WatermarkInvalid {
                    value: watermark.clone(),
                })?;
                info!(offset = self.offset, "using watermark to resume offset pagination");
            }
        }
        self.highest_next_offset = self.offset;
        Ok(())
    }

    async fn fetch_round(&mut self) -> Result<(), SluiceError> {
        let round: Vec<_> = (0..self.config.max_concurrent)
            .map(|index| self.fetch_offset(self.offset + (index as i64) * self.config.limit))
            .collect();
        let responses = join_all(round).await;

        let mut pages: Vec<Option<Vec<Value>>> = Vec::with_capacity(responses.len());
        for response in responses {
            match response? {
                Some(body) => pages.push(Some(extract_items(&body, self.entrypoint.as_deref())?)),
                None => pages.push(None),
            }
        }

        let mut all_empty = true;
        for (index, page) in pages.iter().enumerate() {
            if let Some(items) = page {
                if !items.is_empty() {
                    all_empty = false;
                    let request_offset = self.offset + (index as i64) * self.config.limit;
                    self.highest_next_offset = self
                        .highest_next_offset
                        .max(request_offset + items.len() as i64);
                }
            }
        }
        if all_empty {
            self.exhausted = true;
            return Ok(());
        }

        let has_partial_page = pages.iter().any(|page| {
            page.as_ref()
                .is_some_and(|items| !items.is_empty() && (items.len() as i64) < self.config.limit)
        });

        for page in pages.into_iter().flatten() {
            if !page.is_empty() {
                self.buffer.push_back(page);
            }
        }

        self.offset += (self.config.max_concurrent as i64) * self.config.limit;
        if has_partial_page {
            // A short page means the upstream ran out of rows.
            self.exhausted = true;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SluiceError> {
        self.finished = true;
        if self.incremental {
            self.watermarks
                .set_attempted(
                    &self.source_name,
                    &self.endpoint_name,
                    &self.highest_next_offset.to_string(),
                )
                .await?;
        }
        Ok(())
    }

    async fn fetch_offset(&self, offset: i64) -> Result<Option<Value>, SluiceError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SluiceError::Internal {
                message: "pagination semaphore closed".to_string(),
            })?;
        let mut params = self.request.params.clone();
        params.push((self.config.offset_param.clone(), offset.to_string()));
        params.push((self.config.limit_param.clone(), self.config.limit.to_string()));
        debug!(url = %self.request.url, offset, "fetching paginated page");
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
