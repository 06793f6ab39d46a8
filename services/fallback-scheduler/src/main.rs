//! Job fallback scheduler.
//!
//! Periodically looks for job runs stuck in a pending state and relocates
//! them to the fallback cluster/workspace configured for their source.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fallback_scheduler::{
    config::Config, CycleOutcome, CycleTrigger, FallbackReconciler, FallbackWorker,
    HttpComputeClient, JsonFileRuleStore, ReconcilerSettings,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Relocates stuck jobs to their fallback cluster.
#[derive(Debug, Parser)]
#[command(name = "fallback-scheduler")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Rule file to read instead of the configured one.
    #[arg(long, global = true)]
    rules_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the periodic scheduler until interrupted (default).
    Serve,

    /// Run a single fallback cycle now and exit.
    RunOnce,

    /// Print what the next cycle would do, without changing anything.
    Preview,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(path) = cli.rules_file {
        config.rules_path = path;
    }

    // Prefer RUST_LOG, fall back to FALLBACK_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let client = HttpComputeClient::new(&config.compute).context("failed to build compute client")?;
    let reconciler = Arc::new(FallbackReconciler::new(
        ReconcilerSettings::from_config(&config.scheduler),
        config.scheduler.credential.clone(),
        Arc::new(JsonFileRuleStore::new(config.rules_path.clone())),
        Arc::new(client),
    ));

    info!(
        rules_path = ?config.rules_path,
        compute_api_url = %config.compute.api_url,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(reconciler, config.scheduler.interval).await,
        Command::RunOnce => run_once(&reconciler).await,
        Command::Preview => preview(&reconciler).await,
    }
}

async fn serve(reconciler: Arc<FallbackReconciler>, interval: Duration) -> Result<()> {
    let settings = reconciler.settings();
    if !settings.enabled {
        info!("Job fallback scheduler is disabled");
    } else if reconciler.credential().is_none() {
        error!("SERVICE_API_TOKEN not configured; job fallback scheduler cannot run");
    } else {
        info!(
            stuck_threshold_minutes = settings.stuck_threshold_minutes,
            "Job fallback scheduler enabled"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = FallbackWorker::new(reconciler, interval);
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    // An in-flight migration is allowed to finish its current step chain.
    let shutdown_timeout = Duration::from_secs(60);
    if tokio::time::timeout(shutdown_timeout, worker_handle)
        .await
        .is_err()
    {
        warn!("Fallback worker did not shut down in time");
    }

    info!("Fallback scheduler shutdown complete");
    Ok(())
}

async fn run_once(reconciler: &FallbackReconciler) -> Result<()> {
    if reconciler.credential().is_none() {
        anyhow::bail!("SERVICE_API_TOKEN is not configured");
    }

    match reconciler.run_cycle(CycleTrigger::Manual).await {
        CycleOutcome::Completed(stats) => {
            info!(?stats, "Fallback check finished");
            Ok(())
        }
        CycleOutcome::Skipped(reason) => {
            info!(?reason, "Fallback check skipped");
            Ok(())
        }
        CycleOutcome::Aborted(e) => Err(e).context("fallback check failed"),
    }
}

async fn preview(reconciler: &FallbackReconciler) -> Result<()> {
    let report = reconciler.preview().await.context("preview failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
