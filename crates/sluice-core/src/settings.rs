//! Environment-driven runtime settings.
//!
//! Every deployment knob comes from the process environment: the config
//! profile (`ENV_STATE`), the database driver and connection parts, batch
//! sizing, and log level. Credentials referenced by individual sources
//! (for example `STRIPE_API_KEY`) are read here once and injected into the
//! source catalog, keeping the catalog itself free of ambient lookups.

use std::env;

use sluice_error::ConfigError;

/// Config profile selected by `ENV_STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Dev,
    Prod,
    Test,
}

impl EnvState {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            "test" => Ok(Self::Test),
            _ => Err(ConfigError::InvalidEnvVar {
                name: "ENV_STATE".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Runtime settings resolved once at startup and injected everywhere.
#[derive(Debug, Clone)]
pub struct Settings {
    pub env_state: EnvState,
    /// Database driver name, selects writer/auditor/publisher dialects.
    pub drivername: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_username: String,
    pub db_password: String,
    pub db_database: String,
    /// Reader re-batch size and writer sub-batch size.
    pub batch_size: usize,
    pub log_level: String,
    /// Target URL for the webhook notifier, when configured.
    pub notifier_webhook_url: Option<String>,
    /// Bearer token for the stripe source.
    pub stripe_api_key: Option<String>,
    /// Bearer token for the polygon source.
    pub polygon_api_key: Option<String>,
    /// Query-string credential for the openweather source.
    pub openweather_api_key: Option<String>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_state = EnvState::parse(&optional("ENV_STATE").unwrap_or_else(|| "dev".to_string()))?;
        Ok(Self {
            env_state,
            drivername: optional("DRIVERNAME").unwrap_or_else(|| "postgresql".to_string()),
            db_host: required("DB_HOST")?,
            db_port: parsed("DB_PORT", 5432)?,
            db_username: required("DB_USERNAME")?,
            db_password: required("DB_PASSWORD")?,
            db_database: required("DB_DATABASE")?,
            batch_size: parsed("BATCH_SIZE", 1000)?,
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            notifier_webhook_url: optional("NOTIFIER_WEBHOOK_URL"),
            stripe_api_key: optional("STRIPE_API_KEY"),
            polygon_api_key: optional("POLYGON_API_KEY"),
            openweather_api_key: optional("OPENWEATHER_API_KEY"),
        })
    }

    /// Dev profile drops and recreates target tables on every run.
    pub fn is_dev(&self) -> bool {
        self.env_state == EnvState::Dev
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingEnvVar {
        name: name.to_string(),
    })
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_base_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("ENV_STATE", Some("test")),
                ("DB_HOST", Some("localhost")),
                ("DB_PORT", Some("5433")),
                ("DB_USERNAME", Some("etl")),
                ("DB_PASSWORD", Some("etl")),
                ("DB_DATABASE", Some("warehouse")),
                ("BATCH_SIZE", None),
                ("DRIVERNAME", None),
            ],
            f,
        );
    }

    #[test]
    fn defaults_applied() {
        with_base_env(|| {
            let settings = Settings::from_env().unwrap();
            assert_eq!(settings.env_state, EnvState::Test);
            assert_eq!(settings.drivername, "postgresql");
            assert_eq!(settings.db_port, 5433);
            assert_eq!(settings.batch_size, 1000);
            assert!(!settings.is_dev());
        });
    }

    #[test]
    fn missing_db_host_is_fatal() {
        temp_env::with_vars([("DB_HOST", None::<&str>), ("ENV_STATE", Some("dev"))], || {
            let err = Settings::from_env().unwrap_err();
            assert_eq!(err.error_code(), "config_missing_env");
        });
    }

    #[test]
    fn invalid_env_state_rejected() {
        temp_env::with_vars([("ENV_STATE", Some("staging"))], || {
            let err = Settings::from_env().unwrap_err();
            assert_eq!(err.error_code(), "config_invalid_env");
        });
    }
}
