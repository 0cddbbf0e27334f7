//! Unified error types for the sluice runtime crates.
//!
//! Configuration errors are fatal and never retried; HTTP and database
//! errors carry enough context for the retry layers to classify them.

mod config;
mod http;
mod notify;
mod pipeline;

pub use config::ConfigError;
pub use http::HttpError;
pub use notify::NotifyError;
pub use pipeline::{FieldFailure, PipelineError};

/// Unified error type wrapping all domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SluiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SluiceError {
    /// Stable machine-readable code for this error.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Http(e) => e.error_code(),
            Self::Pipeline(e) => e.error_code(),
            Self::Notify(e) => e.error_code(),
            Self::Database(_) => "database_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Convenience result alias used across the runtime crates.
pub type Result<T, E = SluiceError> = std::result::Result<T, E>;
