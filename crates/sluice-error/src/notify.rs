/// Notification dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook dispatch to {url} failed: {message}")]
    Dispatch { url: String, message: String },

    #[error("Notifier not configured")]
    NotConfigured,
}

impl NotifyError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Dispatch { .. } => "notify_dispatch_failed",
            Self::NotConfigured => "notify_not_configured",
        }
    }
}
