//! Fallback background worker.
//!
//! Starts a reconciliation cycle on a fixed interval. Each cycle runs as its
//! own task so a slow cycle never delays the timer; a tick that lands while
//! a cycle is still executing is skipped by the reconciler's guard.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use super::reconciler::{CycleOutcome, CycleTrigger, FallbackReconciler};

/// Worker that drives periodic fallback cycles.
pub struct FallbackWorker {
    reconciler: Arc<FallbackReconciler>,
    interval: Duration,
}

impl FallbackWorker {
    pub fn new(reconciler: Arc<FallbackReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Run until shutdown is signaled, then wait for an in-flight cycle.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            stuck_threshold_minutes = self.reconciler.settings().stuck_threshold_minutes,
            "Starting fallback worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        let mut cycles = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reconciler = self.reconciler.clone();
                    cycles.spawn(async move {
                        reconciler.run_cycle(CycleTrigger::Scheduled).await
                    });
                }
                Some(result) = cycles.join_next(), if !cycles.is_empty() => {
                    log_cycle_result(result);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Fallback worker shutting down");
                        break;
                    }
                }
            }
        }

        while let Some(result) = cycles.join_next().await {
            log_cycle_result(result);
        }
    }
}

fn log_cycle_result(result: Result<CycleOutcome, tokio::task::JoinError>) {
    match result {
        Ok(CycleOutcome::Completed(stats)) => debug!(?stats, "Fallback cycle finished"),
        Ok(CycleOutcome::Skipped(reason)) => debug!(?reason, "Fallback cycle skipped"),
        Ok(CycleOutcome::Aborted(_)) => {}
        Err(e) if e.is_panic() => error!(error = %e, "Fallback cycle panicked"),
        Err(e) => error!(error = %e, "Fallback cycle task failed"),
    }
}
