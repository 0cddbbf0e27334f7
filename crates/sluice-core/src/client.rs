//! Resilient async HTTP client.
//!
//! Wraps a pooled `reqwest` client with the retry policy every reader and
//! pagination strategy relies on: transient status codes and transport
//! errors are retried with jittered exponential backoff, `Retry-After` is
//! honoured for 429/503, and other 4xx fail fast. One client is created
//! per pipeline runner and released with it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use sluice_error::HttpError;
use tracing::warn;

/// Status codes retried with backoff. 104 shows up from middleboxes that
/// surface connection resets as a status line.
const RETRIABLE_STATUS_CODES: [u16; 7] = [104, 408, 429, 500, 502, 503, 504];

/// Connection-pool and retry tuning.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Total number of attempts (initial + retries).
    pub max_attempts: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 20,
            max_attempts: 5,
        }
    }
}

/// Async HTTP client with automatic retry for transient errors.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    max_attempts: u32,
}

impl HttpClient {
    /// Build the pooled client. HTTP/2 is negotiated via ALPN.
    pub fn new(config: HttpClientConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| HttpError::Transport {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// GET with retry, returning the parsed JSON body.
    pub async fn get(
        &self,
        url: &str,
        backoff_starting_delay: f64,
        headers: Option<&HeaderMap>,
        params: &[(String, String)],
    ) -> Result<Value, HttpError> {
        self.request_with_retry(Method::GET, url, backoff_starting_delay, headers, params, None)
            .await
    }

    /// POST with retry, returning the parsed JSON body.
    pub async fn post(
        &self,
        url: &str,
        backoff_starting_delay: f64,
        headers: Option<&HeaderMap>,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, HttpError> {
        self.request_with_retry(Method::POST, url, backoff_starting_delay, headers, params, body)
            .await
    }

    /// PUT with retry, returning the parsed JSON body.
    pub async fn put(
        &self,
        url: &str,
        backoff_starting_delay: f64,
        headers: Option<&HeaderMap>,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, HttpError> {
        self.request_with_retry(Method::PUT, url, backoff_starting_delay, headers, params, body)
            .await
    }

    /// DELETE with retry, returning the parsed JSON body.
    pub async fn delete(
        &self,
        url: &str,
        backoff_starting_delay: f64,
        headers: Option<&HeaderMap>,
        params: &[(String, String)],
    ) -> Result<Value, HttpError> {
        self.request_with_retry(
            Method::DELETE,
            url,
            backoff_starting_delay,
            headers,
            params,
            None,
        )
        .await
    }

    async fn request_with_retry(
        &self,
        method: Method,
        url: &str,
        backoff_starting_delay: f64,
        headers: Option<&HeaderMap>,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, HttpError> {
        let mut last_error: Option<HttpError> = None;

        for attempt in 0..self.max_attempts {
            let mut request = self.client.request(method.clone(), url);
            if let Some(headers) = headers {
                request = request.headers(headers.clone());
            }
            if !params.is_empty() {
                request = request.query(params);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if RETRIABLE_STATUS_CODES.contains(&status.as_u16()) {
                        let error = HttpError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        };
                        if attempt + 1 < self.max_attempts {
                            let backoff = backoff_for_response(
                                status,
                                response.headers(),
                                attempt,
                                backoff_starting_delay,
                            );
                            warn!(
                                %method,
                                url,
                                status = status.as_u16(),
                                attempt = attempt + 1,
                                max_attempts = self.max_attempts,
                                "transient status, retrying in {:.2}s",
                                backoff.as_secs_f64(),
                            );
                            last_error = Some(error);
                            tokio::time::sleep(backoff).await;
                            continue;
                        }
                        return Err(HttpError::RetriesExhausted {
                            attempts: self.max_attempts,
                            url: url.to_string(),
                            last_error: error.to_string(),
                        });
                    }
                    if !status.is_success() {
                        // Non-retriable status, fail fast.
                        return Err(HttpError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    return response.json::<Value>().await.map_err(|e| HttpError::Decode {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    if e.is_builder() {
                        return Err(HttpError::Transport {
                            url: url.to_string(),
                            message: e.to_string(),
                        });
                    }
                    let error = HttpError::Transport {
                        url: url.to_string(),
                        message: e.to_string(),
                    };
                    if attempt + 1 < self.max_attempts {
                        let backoff = calculate_backoff(attempt, backoff_starting_delay);
                        warn!(
                            %method,
                            url,
                            attempt = attempt + 1,
                            max_attempts = self.max_attempts,
                            "transport error ({e}), retrying in {:.2}s",
                            backoff.as_secs_f64(),
                        );
                        last_error = Some(error);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(HttpError::RetriesExhausted {
                        attempts: self.max_attempts,
                        url: url.to_string(),
                        last_error: error.to_string(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| HttpError::Transport {
            url: url.to_string(),
            message: "request loop exited without a response".to_string(),
        }))
    }
}

/// Exponential backoff with jitter around the starting delay.
fn calculate_backoff(attempt: u32, backoff_starting_delay: f64) -> Duration {
    let low = backoff_starting_delay - 0.2;
    let high = backoff_starting_delay + 0.2;
    let base = rand::thread_rng().gen_range(low..high);
    Duration::from_secs_f64((base * 2f64.powi(attempt as i32)).max(0.0))
}

/// Backoff for a retriable response; `Retry-After` wins for 429/503.
fn backoff_for_response(
    status: StatusCode,
    headers: &HeaderMap,
    attempt: u32,
    backoff_starting_delay: f64,
) -> Duration {
    if matches!(status.as_u16(), 429 | 503) {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        if let Some(seconds) = retry_after {
            return Duration::from_secs_f64(seconds);
        }
    }
    calculate_backoff(attempt, backoff_starting_delay)
}

/// Parse a `Retry-After` value: integer seconds or an HTTP-date.
/// Past dates yield `None` so the caller falls back to computed backoff.
fn parse_retry_after(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        return Some(seconds.max(0) as f64);
    }
    let retry_at = DateTime::parse_from_rfc2822(value).ok()?;
    let seconds = (retry_at.with_timezone(&Utc) - Utc::now()).num_milliseconds() as f64 / 1000.0;
    if seconds <= 0.0 {
        None
    } else {
        Some(seconds)
    }
}
