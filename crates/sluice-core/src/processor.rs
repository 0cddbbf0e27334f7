//! Two-tier scheduler: APIs in parallel, endpoints sequential per API.
//!
//! A queue of APIs is drained by one worker per physical core. Endpoints
//! inside an API always run one at a time, in declaration order, to
//! respect API-level rate limits; a failing endpoint is recorded and the
//! remaining endpoints of the same API still run.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sluice_error::SluiceError;
use sqlx::PgPool;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::db::connect_pool;
use crate::notify::Notifier;
use crate::runner::{EndpointResult, PipelineRunner};
use crate::settings::Settings;
use crate::source::SourceRegistry;
use crate::tables::TableManager;
use crate::watermark::{SqlWatermarks, Watermarks};

/// Owns the database pool and fans endpoint work out across workers.
pub struct Processor {
    pool: PgPool,
    settings: Arc<Settings>,
    registry: Arc<SourceRegistry>,
    watermarks: Arc<dyn Watermarks>,
    notifier: Option<Arc<dyn Notifier>>,
    results: Mutex<Vec<EndpointResult>>,
}

impl Processor {
    /// Connect the pool and ensure the watermark table exists.
    pub async fn new(
        settings: Settings,
        registry: SourceRegistry,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Arc<Self>, SluiceError> {
        let settings = Arc::new(settings);
        let pool = connect_pool(&settings).await?;
        let manager = TableManager::new(pool.clone(), &settings);
        manager.create_watermark_table().await?;
        let watermarks: Arc<dyn Watermarks> = Arc::new(SqlWatermarks::new(pool.clone()));
        info!("processor initialized");
        Ok(Arc::new(Self {
            pool,
            settings,
            registry: Arc::new(registry),
            watermarks,
            notifier,
            results: Mutex::new(Vec::new()),
        }))
    }

    /// Process one endpoint of one source.
    pub async fn process_endpoint(&self, source_name: &str, endpoint: &str) -> Result<(), SluiceError> {
        let source = self.registry.get_source(source_name)?;
        let endpoint_config = source.endpoint_config(endpoint)?.clone();

        let manager = TableManager::new(self.pool.clone(), &self.settings);
        manager.create_production_tables(&endpoint_config).await?;

        let runner = PipelineRunner::new(
            source,
            endpoint,
            endpoint_config,
            self.pool.clone(),
            Arc::clone(&self.settings),
            Arc::clone(&self.watermarks),
        );
        let result = runner.run().await;
        self.results
            .lock()
            .expect("results lock poisoned")
            .push(result);
        Ok(())
    }

    /// Process every endpoint of one source, sequentially and in
    /// declaration order.
    pub async fn process_api(&self, name: &str) -> Result<(), SluiceError> {
        let source = self.registry.get_source(name)?;
        let endpoints: Vec<String> = source.endpoints.keys().cloned().collect();
        for endpoint in endpoints {
            self.process_endpoint(name, &endpoint).await?;
        }
        Ok(())
    }

    /// Process every registered source, APIs in parallel across workers
    /// sized to the physical core count.
    pub async fn process(self: Arc<Self>) -> Result<(), SluiceError> {
        let queue: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(
            self.registry
                .all_sources()
                .iter()
                .map(|source| source.name.clone())
                .collect(),
        ));
        let workers = num_cpus::get_physical().max(1);
        info!(workers, "processing all sources");

        let mut set: JoinSet<Result<(), SluiceError>> = JoinSet::new();
        for _ in 0..workers {
            let this = Arc::clone(&self);
            let queue = Arc::clone(&queue);
            set.spawn(async move {
                loop {
                    let next = queue.lock().expect("api queue poisoned").pop_front();
                    let Some(name) = next else {
                        return Ok(());
                    };
                    this.process_api(&name).await?;
                }
            });
        }

        let mut outcome: Result<(), SluiceError> = Ok(());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
                Err(e) => {
                    if outcome.is_ok() {
                        outcome = Err(SluiceError::Internal {
                            message: format!("worker task failed: {e}"),
                        });
                    }
                }
            }
        }
        outcome
    }

    /// Captured per-endpoint results, in completion order.
    pub fn results(&self) -> Vec<EndpointResult> {
        self.results
            .lock()
            .expect("results lock poisoned")
            .clone()
    }

    /// Log the summary, dispatch the notifier when anything failed, and
    /// report whether the whole run succeeded.
    pub async fn results_summary(&self) -> Result<bool, SluiceError> {
        let results = self.results();
        for result in &results {
            if result.ok {
                info!(url = %result.url, "endpoint succeeded");
            }
        }
        let failures: Vec<&EndpointResult> = results.iter().filter(|r| !r.ok).collect();
        if failures.is_empty() {
            return Ok(true);
        }

        let body = failures
            .iter()
            .map(|r| {
                format!(
                    "{}: {}",
                    r.url,
                    r.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        error!(failures = failures.len(), "endpoint failures:\n{body}");
        if let Some(notifier) = &self.notifier {
            notifier.notify(&body).await?;
        }
        Ok(false)
    }

    /// Dispose of the database pool. Always call on the way out.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
