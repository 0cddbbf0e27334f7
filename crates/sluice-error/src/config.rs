/// Fatal configuration errors. These are raised immediately and never
/// retried: a bad registry entry or environment cannot heal on its own.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {name}")]
    MissingEnvVar { name: String },

    #[error("Invalid value for {name}: {value}")]
    InvalidEnvVar { name: String, value: String },

    #[error("Source not found: {name}")]
    UnknownSource { name: String },

    #[error("Endpoint '{endpoint}' not found in source '{source_name}'. Available endpoints: {available}")]
    UnknownEndpoint {
        source_name: String,
        endpoint: String,
        available: String,
    },

    #[error("Unsupported driver: {driver}. Supported drivers: {supported}")]
    UnsupportedDriver { driver: String, supported: String },

    #[error("Unsupported notifier: {kind}")]
    UnsupportedNotifier { kind: String },

    #[error("Invalid data model '{model}': {message}")]
    InvalidModel { model: String, message: String },

    #[error("Invalid header '{name}' in source '{source_name}'")]
    InvalidHeader { source_name: String, name: String },
}

impl ConfigError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MissingEnvVar { .. } => "config_missing_env",
            Self::InvalidEnvVar { .. } => "config_invalid_env",
            Self::UnknownSource { .. } => "config_unknown_source",
            Self::UnknownEndpoint { .. } => "config_unknown_endpoint",
            Self::UnsupportedDriver { .. } => "config_unsupported_driver",
            Self::UnsupportedNotifier { .. } => "config_unsupported_notifier",
            Self::InvalidModel { .. } => "config_invalid_model",
            Self::InvalidHeader { .. } => "config_invalid_header",
        }
    }
}
