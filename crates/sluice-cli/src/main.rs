//! sluice CLI - run declarative API-to-warehouse ETL pipelines.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sluice_core::notify::create_notifier;
use sluice_core::processor::Processor;
use sluice_core::settings::Settings;
use sluice_core::sources;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(author, version, about = "Declarative ETL pipelines for HTTP APIs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process all sources, one source, or a single endpoint
    Process {
        /// API source to process, e.g. dummyjson
        #[arg(short, long)]
        source: Option<String>,

        /// API endpoint to process, e.g. products (requires --source)
        #[arg(short, long)]
        endpoint: Option<String>,
    },
}

fn main() -> std::process::ExitCode {
    // .env is a dev convenience; absence is fine.
    dotenvy::dotenv().ok();

    match run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env().context("loading settings from environment")?;

    let filter = EnvFilter::try_new(&settings.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get_physical().max(1))
        .enable_all()
        .build()
        .context("building async runtime")?;

    let Commands::Process { source, endpoint } = cli.command;
    runtime.block_on(process(settings, source, endpoint))
}

async fn process(
    settings: Settings,
    source: Option<String>,
    endpoint: Option<String>,
) -> Result<()> {
    if endpoint.is_some() && source.is_none() {
        bail!("--endpoint requires --source");
    }

    let registry = sources::registry(&settings).context("building source registry")?;
    let notifier = if settings.notifier_webhook_url.is_some() {
        Some(create_notifier("webhook", &settings).context("building notifier")?)
    } else {
        None
    };

    let processor = Processor::new(settings, registry, notifier)
        .await
        .context("initializing processor")?;

    let outcome = match (source, endpoint) {
        (Some(source), Some(endpoint)) => {
            tracing::info!(%source, %endpoint, "processing endpoint");
            processor.process_endpoint(&source, &endpoint).await
        }
        (Some(source), None) => {
            tracing::info!(%source, "processing API");
            processor.process_api(&source).await
        }
        (None, None) => {
            tracing::info!("processing all APIs");
            std::sync::Arc::clone(&processor).process().await
        }
        (None, Some(_)) => unreachable!("rejected above"),
    };

    let summary = processor.results_summary().await;
    processor.close().await;

    outcome.context("processing failed")?;
    summary.context("summarizing results")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
