//! Fallback reconciliation primitives.
//!
//! This library holds the pure decision logic behind the job fallback
//! scheduler. Nothing in here performs I/O; the scheduler service feeds it
//! data fetched from the rule store and the compute platform. Key concepts:
//!
//! - **Stuck job**: a CREATED/SCHEDULED run older than the configured threshold.
//! - **Rule group**: all fallback rules sharing one source cluster/workspace.
//! - **Migration**: recreating a stuck job's deployment on the destination,
//!   triggering it, and terminating the original run.
//!
//! # Invariants
//!
//! - Job-specific rules always outrank generic rules within a group
//! - Derived deployment names satisfy the platform naming grammar
//! - Pagination always terminates, even on empty pages
//! - Decisions are deterministic given the same inputs (except the random
//!   name suffix)

use std::time::Duration;

use thiserror::Error;

pub mod ledger;
pub mod manifest;
pub mod model;
pub mod naming;
pub mod paging;
pub mod retry;
pub mod rules;
pub mod stuck;

pub use ledger::{MigrationLedger, MigrationStage};
pub use manifest::retarget_manifest;
pub use model::{FallbackRule, JobRun, JobRunPage, JobRunStatus, RuleDestination, RuleSource};
pub use naming::{fallback_name, is_valid_deployment_name};
pub use paging::{PageRequest, Pager};
pub use retry::RetryPolicy;
pub use rules::{group_rules, match_rule, RuleGroup, SourceKey};
pub use stuck::{age_minutes, is_stuck};

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The deployment manifest cannot be retargeted.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A rule is missing data required to migrate a job.
    #[error("incomplete rule {rule_id}: {reason}")]
    IncompleteRule { rule_id: String, reason: String },
}

/// Default interval between reconciliation cycles.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default age after which a pending run counts as stuck.
pub const DEFAULT_STUCK_THRESHOLD_MINUTES: u64 = 60;

/// Default attempt limit for the trigger and terminate steps.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between trigger/terminate attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Default wait between creating the destination application and triggering it.
pub const DEFAULT_TRIGGER_DELAY: Duration = Duration::from_secs(5);

/// Job runs requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default retention for migration ledger entries.
pub const DEFAULT_LEDGER_TTL: Duration = Duration::from_secs(60 * 60);
