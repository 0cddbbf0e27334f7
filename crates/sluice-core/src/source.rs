//! Declarative source catalog types.
//!
//! An [`ApiConfig`] describes one upstream API: transport, default
//! headers/params, optional pagination and authentication strategies, and
//! a map of endpoint names to [`ApiEndpointConfig`]. Strategies are tagged
//! variants carrying their own parameters, so a strategy can never be
//! selected without its configuration (and vice versa).

use std::sync::Arc;

use indexmap::IndexMap;
use sluice_error::ConfigError;

use crate::model::DataModel;

/// Transport used by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Rest,
    GraphQl,
}

/// Authentication strategy and its parameters.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// Where query-driven pagination substitutes each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueIn {
    Path,
    Params,
}

/// Offset pagination parameters.
#[derive(Debug, Clone)]
pub struct OffsetPagination {
    pub offset_param: String,
    pub limit_param: String,
    pub offset: i64,
    pub limit: i64,
    pub start_offset: i64,
    pub max_concurrent: usize,
}

/// Cursor pagination parameters.
#[derive(Debug, Clone)]
pub struct CursorPagination {
    pub cursor_param: String,
    /// Dotted path to the next token, supports array segments like
    /// `data[-1].id`.
    pub next_cursor_key: String,
    pub limit_param: String,
    pub limit: i64,
    pub initial_value: Option<String>,
}

/// Next-URL pagination parameters.
#[derive(Debug, Clone)]
pub struct NextUrlPagination {
    pub next_url_key: String,
}

/// Query-driven pagination parameters.
#[derive(Debug, Clone)]
pub struct QueryPagination {
    /// SQL executed against the pipeline's own database; each row drives
    /// one GET.
    pub query: String,
    pub value_in: ValueIn,
    /// Template substituted per row when `value_in` is `Params`.
    pub params: Option<String>,
    pub max_concurrent: usize,
}

/// Pagination strategy and its parameters.
#[derive(Debug, Clone)]
pub enum PaginationConfig {
    Offset(OffsetPagination),
    Cursor(CursorPagination),
    NextUrl(NextUrlPagination),
    Query(QueryPagination),
}

/// One target table fed by an endpoint.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub model: Arc<DataModel>,
    /// Audit SQL template run against the stage table; `{table}` is
    /// substituted. Result columns are named boolean audits.
    pub audit_query: Option<String>,
}

impl TableConfig {
    pub fn new(model: Arc<DataModel>) -> Self {
        Self {
            model,
            audit_query: None,
        }
    }

    #[must_use]
    pub fn audit_query(mut self, sql: &str) -> Self {
        self.audit_query = Some(sql.to_string());
        self
    }
}

/// Per-endpoint configuration.
#[derive(Debug, Clone)]
pub struct ApiEndpointConfig {
    /// Overrides the source-level JSON entrypoint when set.
    pub json_entrypoint: Option<String>,
    /// Request body for GraphQL endpoints (`query` + `variables`).
    pub body: Option<serde_json::Value>,
    pub params: IndexMap<String, String>,
    /// Starting delay for HTTP retry backoff, in seconds.
    pub backoff_starting_delay: f64,
    /// Incremental endpoints advance a watermark on success.
    pub incremental: bool,
    pub tables: Vec<TableConfig>,
}

impl Default for ApiEndpointConfig {
    fn default() -> Self {
        Self {
            json_entrypoint: None,
            body: None,
            params: IndexMap::new(),
            backoff_starting_delay: 1.0,
            incremental: false,
            tables: Vec::new(),
        }
    }
}

impl ApiEndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn json_entrypoint(mut self, entrypoint: &str) -> Self {
        self.json_entrypoint = Some(entrypoint.to_string());
        self
    }

    #[must_use]
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn backoff_starting_delay(mut self, seconds: f64) -> Self {
        self.backoff_starting_delay = seconds;
        self
    }

    #[must_use]
    pub fn incremental(mut self) -> Self {
        self.incremental = true;
        self
    }

    #[must_use]
    pub fn table(mut self, table: TableConfig) -> Self {
        self.tables.push(table);
        self
    }
}

/// One upstream API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub name: String,
    pub base_url: String,
    pub transport: TransportKind,
    pub default_headers: IndexMap<String, String>,
    pub default_params: IndexMap<String, String>,
    /// Source-level JSON entrypoint, overridable per endpoint.
    pub json_entrypoint: Option<String>,
    pub pagination: Option<PaginationConfig>,
    pub authentication: Option<AuthConfig>,
    /// Endpoint name → config, in declaration (processing) order.
    pub endpoints: IndexMap<String, ApiEndpointConfig>,
}

impl ApiConfig {
    pub fn new(name: &str, base_url: &str, transport: TransportKind) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            transport,
            default_headers: IndexMap::new(),
            default_params: IndexMap::new(),
            json_entrypoint: None,
            pagination: None,
            authentication: None,
            endpoints: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.default_params
            .insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn json_entrypoint(mut self, entrypoint: &str) -> Self {
        self.json_entrypoint = Some(entrypoint.to_string());
        self
    }

    #[must_use]
    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = Some(pagination);
        self
    }

    #[must_use]
    pub fn authentication(mut self, auth: AuthConfig) -> Self {
        self.authentication = Some(auth);
        self
    }

    #[must_use]
    pub fn endpoint(mut self, name: &str, config: ApiEndpointConfig) -> Self {
        self.endpoints.insert(name.to_string(), config);
        self
    }

    /// Endpoint config by name, listing the available names on a miss.
    pub fn endpoint_config(&self, endpoint: &str) -> Result<&ApiEndpointConfig, ConfigError> {
        self.endpoints
            .get(endpoint)
            .ok_or_else(|| ConfigError::UnknownEndpoint {
                source_name: self.name.clone(),
                endpoint: endpoint.to_string(),
                available: self
                    .endpoints
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Static catalog of sources, keyed by name.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: IndexMap<String, Arc<ApiConfig>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: ApiConfig) {
        self.sources.insert(source.name.clone(), Arc::new(source));
    }

    pub fn add_sources(&mut self, sources: Vec<ApiConfig>) {
        for source in sources {
            self.add_source(source);
        }
    }

    pub fn get_source(&self, name: &str) -> Result<Arc<ApiConfig>, ConfigError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSource {
                name: name.to_string(),
            })
    }

    /// All sources in registration order.
    pub fn all_sources(&self) -> Vec<Arc<ApiConfig>> {
        self.sources.values().cloned().collect()
    }
}
