//! Failure notification dispatch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sluice_error::{ConfigError, NotifyError, SluiceError};

use crate::settings::Settings;

/// Receives the end-of-run summary when any endpoint failed.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Posts the summary to a webhook as a structured message.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Dispatch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "title": "API Processing Summary",
            "level": "ERROR",
            "message": message,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Dispatch {
                url: self.url.clone(),
                message: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(NotifyError::Dispatch {
                url: self.url.clone(),
                message: format!("HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}

/// Notifier for the configured kind.
pub fn create_notifier(kind: &str, settings: &Settings) -> Result<Arc<dyn Notifier>, SluiceError> {
    match kind {
        "webhook" => {
            let url = settings.notifier_webhook_url.as_ref().ok_or_else(|| {
                ConfigError::MissingEnvVar {
                    name: "NOTIFIER_WEBHOOK_URL".to_string(),
                }
            })?;
            Ok(Arc::new(WebhookNotifier::new(url)?))
        }
        other => Err(ConfigError::UnsupportedNotifier {
            kind: other.to_string(),
        }
        .into()),
    }
}
