//! Fallback reconciler.
//!
//! One cycle:
//! - Reads every fallback rule and groups them by source cluster/workspace
//! - Pages through the pending job runs of each source group
//! - Moves every run older than the stuck threshold to the destination of
//!   its matching rule
//!
//! Cycles are single-flight per reconciler: a cycle requested while another
//! is executing is skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fallback_reconcile::{
    group_rules, is_stuck, JobRunStatus, MigrationLedger, Pager, RuleGroup, SourceKey,
};
use tracing::{debug, error, info, instrument, warn};

use crate::compute::{ComputeClient, ComputeError, Credential, JobRunQuery};
use crate::config::SchedulerConfig;
use crate::migration::{MigrationExecutor, MigrationOutcome, MigrationSettings};
use crate::rules::{RuleStore, RuleStoreError};

/// Errors that abort a cycle or a single source group.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to load fallback rules: {0}")]
    RuleStore(#[from] RuleStoreError),

    #[error("no service credential configured")]
    MissingCredential,

    #[error("failed to list job runs in {location}: {error}")]
    ListJobRuns {
        location: SourceKey,
        #[source]
        error: ComputeError,
    },
}

/// Reconciler settings, read once at startup.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Scheduled cycles run only when enabled. Manual cycles ignore this.
    pub enabled: bool,
    pub stuck_threshold_minutes: u64,
    pub page_size: u32,
    pub migration: MigrationSettings,
    pub ledger_ttl: Duration,
}

impl ReconcilerSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            enabled: config.enabled,
            stuck_threshold_minutes: config.stuck_threshold_minutes,
            page_size: fallback_reconcile::DEFAULT_PAGE_SIZE,
            migration: MigrationSettings {
                trigger_delay: config.trigger_delay,
                retry: fallback_reconcile::RetryPolicy::fixed(
                    config.trigger_max_retries,
                    config.trigger_retry_delay,
                ),
            },
            ledger_ttl: config.ledger_ttl,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// The periodic worker.
    Scheduled,
    /// An operator (`run-once`).
    Manual,
}

/// Why a cycle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    MissingCredential,
    AlreadyRunning,
    NoRules,
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub groups_processed: usize,
    pub groups_failed: usize,
    pub runs_evaluated: usize,
    pub runs_stuck: usize,
    pub runs_unmatched: usize,
    pub migrations_succeeded: usize,
    pub migrations_failed: usize,
}

impl CycleStats {
    fn absorb(&mut self, group: &GroupStats) {
        self.runs_evaluated += group.runs_evaluated;
        self.runs_stuck += group.runs_stuck;
        self.runs_unmatched += group.runs_unmatched;
        self.migrations_succeeded += group.migrations_succeeded;
        self.migrations_failed += group.migrations_failed;
    }
}

/// Result of [`FallbackReconciler::run_cycle`].
#[derive(Debug)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed(CycleStats),
    /// The cycle failed before any group was processed.
    Aborted(SchedulerError),
}

#[derive(Debug, Default)]
struct GroupStats {
    runs_evaluated: usize,
    runs_stuck: usize,
    runs_unmatched: usize,
    migrations_succeeded: usize,
    migrations_failed: usize,
}

/// Clears the running flag when dropped.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The fallback reconciler.
pub struct FallbackReconciler {
    settings: ReconcilerSettings,
    credential: Option<Credential>,
    rules: Arc<dyn RuleStore>,
    client: Arc<dyn ComputeClient>,
    executor: MigrationExecutor,
    running: AtomicBool,
}

impl FallbackReconciler {
    pub fn new(
        settings: ReconcilerSettings,
        credential: Option<Credential>,
        rules: Arc<dyn RuleStore>,
        client: Arc<dyn ComputeClient>,
    ) -> Self {
        let executor = MigrationExecutor::new(
            client.clone(),
            settings.migration.clone(),
            MigrationLedger::new(settings.ledger_ttl),
        );

        Self {
            settings,
            credential,
            rules,
            client,
            executor,
            running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub(crate) fn rule_store(&self) -> &dyn RuleStore {
        self.rules.as_ref()
    }

    pub fn executor(&self) -> &MigrationExecutor {
        &self.executor
    }

    /// Whether a cycle is executing right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one reconciliation cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> CycleOutcome {
        if trigger == CycleTrigger::Scheduled && !self.settings.enabled {
            debug!("Fallback scheduler disabled; skipping cycle");
            return CycleOutcome::Skipped(SkipReason::Disabled);
        }

        let Some(auth) = self.credential.as_ref() else {
            debug!("No service credential configured; skipping cycle");
            return CycleOutcome::Skipped(SkipReason::MissingCredential);
        };

        let Some(_guard) = CycleGuard::acquire(&self.running) else {
            warn!("Previous fallback cycle is still running; skipping this one");
            return CycleOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        info!("Starting stuck job check");
        match self.reconcile_all(auth).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Stuck job check failed");
                CycleOutcome::Aborted(e)
            }
        }
    }

    async fn reconcile_all(&self, auth: &Credential) -> Result<CycleOutcome, SchedulerError> {
        self.executor.prune_ledger().await;

        let rules = self.rules.list_rules().await?;
        if rules.is_empty() {
            debug!("No fallback rules configured");
            return Ok(CycleOutcome::Skipped(SkipReason::NoRules));
        }

        let total_rules = rules.len();
        let groups = group_rules(rules);
        info!(
            rule_count = total_rules,
            source_count = groups.len(),
            "Loaded fallback rules"
        );

        let mut stats = CycleStats::default();
        for group in groups.values() {
            match self.reconcile_group(auth, group).await {
                Ok(group_stats) => {
                    stats.groups_processed += 1;
                    stats.absorb(&group_stats);
                }
                Err(e) => {
                    error!(
                        source_cluster_id = %group.source.cluster_id,
                        source_workspace_id = %group.source.workspace_id,
                        error = %e,
                        "Failed to process source group"
                    );
                    stats.groups_failed += 1;
                }
            }
        }

        info!(
            groups_processed = stats.groups_processed,
            groups_failed = stats.groups_failed,
            runs_evaluated = stats.runs_evaluated,
            runs_stuck = stats.runs_stuck,
            runs_unmatched = stats.runs_unmatched,
            migrations_succeeded = stats.migrations_succeeded,
            migrations_failed = stats.migrations_failed,
            "Stuck job check complete"
        );

        Ok(CycleOutcome::Completed(stats))
    }

    /// Page through one source group and migrate its stuck runs.
    #[instrument(
        skip_all,
        fields(
            source_cluster_id = %group.source.cluster_id,
            source_workspace_id = %group.source.workspace_id,
        )
    )]
    async fn reconcile_group(
        &self,
        auth: &Credential,
        group: &RuleGroup,
    ) -> Result<GroupStats, SchedulerError> {
        let mut stats = GroupStats::default();
        let mut pager = Pager::new(self.settings.page_size);

        while let Some(page) = self.next_page(auth, &group.source, &mut pager).await? {
            let now = Utc::now().timestamp_millis();
            for run in &page {
                stats.runs_evaluated += 1;
                if !is_stuck(run, now, self.settings.stuck_threshold_minutes) {
                    continue;
                }
                stats.runs_stuck += 1;

                let Some(rule) = group.match_run(run) else {
                    debug!(
                        job_run_id = %run.id,
                        application_id = %run.application_id,
                        "No fallback rule matches stuck job"
                    );
                    stats.runs_unmatched += 1;
                    continue;
                };

                match self.executor.migrate(auth, run, rule).await {
                    MigrationOutcome::Completed { .. } => stats.migrations_succeeded += 1,
                    MigrationOutcome::Failed(_) => stats.migrations_failed += 1,
                }
            }
        }

        log_group_summary(&stats);
        Ok(stats)
    }

    /// Fetch the next page of pending runs for `source`, or `None` once the
    /// listing is exhausted.
    pub(crate) async fn next_page(
        &self,
        auth: &Credential,
        source: &SourceKey,
        pager: &mut Pager,
    ) -> Result<Option<Vec<fallback_reconcile::JobRun>>, SchedulerError> {
        let Some(request) = pager.next_request() else {
            return Ok(None);
        };

        let query = JobRunQuery {
            statuses: JobRunStatus::PENDING.to_vec(),
            limit: request.limit,
            offset: request.offset,
        };
        let page = self
            .client
            .list_job_runs(auth, &source.cluster_id, &source.workspace_id, &query)
            .await
            .map_err(|error| SchedulerError::ListJobRuns {
                location: source.clone(),
                error,
            })?;

        debug!(
            offset = request.offset,
            returned = page.runs.len(),
            has_more = page.has_more,
            "Fetched job run page"
        );
        pager.advance(page.runs.len(), page.has_more);

        Ok(Some(page.runs))
    }
}

fn log_group_summary(stats: &GroupStats) {
    info!(
        runs_evaluated = stats.runs_evaluated,
        runs_stuck = stats.runs_stuck,
        runs_unmatched = stats.runs_unmatched,
        migrations_succeeded = stats.migrations_succeeded,
        migrations_failed = stats.migrations_failed,
        "Processed job runs for source"
    );
}
