/// Errors surfaced by the HTTP client and the readers built on it.
///
/// `Status` keeps the status code so the pagination layer can treat a 400
/// as the expected end-of-data signal while re-raising everything else.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Transport error on {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Retries exhausted after {attempts} attempts on {url}: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        url: String,
        last_error: String,
    },

    #[error("Failed to decode response body from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("JSON entrypoint '{entrypoint}' not found in response")]
    EntrypointMissing { entrypoint: String },
}

impl HttpError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Status { .. } => "http_status",
            Self::Transport { .. } => "http_transport",
            Self::RetriesExhausted { .. } => "http_retries_exhausted",
            Self::Decode { .. } => "http_decode",
            Self::EntrypointMissing { .. } => "http_entrypoint_missing",
        }
    }

    /// Status code, when this error carries one.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
