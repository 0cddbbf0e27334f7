//! End-to-end execution of one `(source, endpoint)` pair.

use std::sync::Arc;

use sluice_error::SluiceError;
use sqlx::PgPool;
use tracing::{error, info, Instrument};

use crate::audit::create_auditor;
use crate::client::{HttpClient, HttpClientConfig};
use crate::parse::JsonParser;
use crate::publish::create_publisher;
use crate::read::Reader;
use crate::settings::Settings;
use crate::source::{ApiConfig, ApiEndpointConfig};
use crate::tables::TableManager;
use crate::watermark::Watermarks;
use crate::write::create_writer;

/// Outcome of one endpoint run. Failures are captured, never raised.
#[derive(Debug, Clone)]
pub struct EndpointResult {
    pub ok: bool,
    pub url: String,
    pub error: Option<String>,
}

/// Owns the reader/parser/writer/auditor/publisher chain (and the HTTP
/// client) for a single endpoint; everything is released when `run`
/// returns.
pub struct PipelineRunner {
    source: Arc<ApiConfig>,
    endpoint_name: String,
    endpoint_config: ApiEndpointConfig,
    url: String,
    pool: PgPool,
    settings: Arc<Settings>,
    watermarks: Arc<dyn Watermarks>,
}

impl PipelineRunner {
    pub fn new(
        source: Arc<ApiConfig>,
        endpoint_name: &str,
        endpoint_config: ApiEndpointConfig,
        pool: PgPool,
        settings: Arc<Settings>,
        watermarks: Arc<dyn Watermarks>,
    ) -> Self {
        let endpoint_path = endpoint_name.trim_start_matches('/');
        let url = format!(
            "{}/{}",
            source.base_url.trim_end_matches('/'),
            endpoint_path
        );
        Self {
            source,
            endpoint_name: endpoint_name.to_string(),
            endpoint_config,
            url,
            pool,
            settings,
            watermarks,
        }
    }

    /// Run the endpoint to completion, capturing any failure in the
    /// result rather than raising it.
    pub async fn run(&self) -> EndpointResult {
        let span = tracing::info_span!(
            "pipeline",
            source = %self.source.name,
            endpoint = %self.endpoint_name,
        );
        match self.execute().instrument(span).await {
            Ok(()) => EndpointResult {
                ok: true,
                url: self.url.clone(),
                error: None,
            },
            Err(e) => {
                error!(
                    source = %self.source.name,
                    endpoint = %self.endpoint_name,
                    error = %e,
                    "pipeline run failed"
                );
                EndpointResult {
                    ok: false,
                    url: self.url.clone(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn execute(&self) -> Result<(), SluiceError> {
        let tables = TableManager::new(self.pool.clone(), &self.settings);
        tables.create_stage_tables(&self.endpoint_config).await?;

        let client = Arc::new(HttpClient::new(HttpClientConfig::default())?);
        let reader = Reader::new(
            Arc::clone(&self.source),
            &self.endpoint_name,
            client,
            Arc::clone(&self.watermarks),
            Some(self.pool.clone()),
            self.settings.batch_size,
        );
        let parser = JsonParser::new(&self.endpoint_config)?;
        let writer = create_writer(
            &self.settings.drivername,
            self.pool.clone(),
            self.settings.batch_size,
        )?;
        let auditor = create_auditor(&self.settings.drivername, self.pool.clone(), &self.endpoint_config)?;
        let publisher =
            create_publisher(&self.settings.drivername, self.pool.clone(), &self.endpoint_config)?;

        let mut batches = reader.read(&self.url, &self.endpoint_config)?;
        while let Some(batch) = batches.next_batch().await? {
            let table_batches = parser.parse(&batch)?;
            writer.write(&table_batches).await?;
        }

        auditor.audit_grain().await?;
        auditor.audit_data().await?;
        publisher.publish().await?;
        self.watermarks
            .commit(&self.source.name, &self.endpoint_name)
            .await?;
        tables.drop_stage_tables(&self.endpoint_config).await?;

        info!(url = %self.url, "endpoint processed");
        Ok(())
    }
}
