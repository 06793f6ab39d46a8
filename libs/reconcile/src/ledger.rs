//! In-memory record of partially completed migrations.
//!
//! A migration that created the destination application but failed later
//! leaves its source run pending, so the next cycle sees it as stuck again.
//! The ledger remembers how far each run got so the scheduler can resume
//! instead of creating a second destination application.
//!
//! Entries are process-local and expire after a fixed window.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::DEFAULT_LEDGER_TTL;

/// Last completed step of a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStage {
    /// Destination application exists but has not been triggered.
    Created { application_id: String },

    /// Destination job was triggered; the source run still needs terminating.
    Triggered { application_id: String },
}

impl MigrationStage {
    /// The destination application this migration created.
    pub fn application_id(&self) -> &str {
        match self {
            Self::Created { application_id } | Self::Triggered { application_id } => {
                application_id
            }
        }
    }
}

/// Migration progress keyed by source job-run id.
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    /// How long an entry stays valid after it was recorded.
    ttl: Duration,

    /// job_run_id -> (stage, recorded_at).
    entries: BTreeMap<String, (MigrationStage, Instant)>,
}

impl MigrationLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: BTreeMap::new(),
        }
    }

    /// Record that `job_run_id` reached `stage`.
    pub fn record(&mut self, job_run_id: &str, stage: MigrationStage) {
        self.entries
            .insert(job_run_id.to_string(), (stage, Instant::now()));
    }

    /// The live stage recorded for `job_run_id`, if any.
    pub fn stage(&self, job_run_id: &str) -> Option<&MigrationStage> {
        let (stage, recorded_at) = self.entries.get(job_run_id)?;
        (recorded_at.elapsed() <= self.ttl).then_some(stage)
    }

    /// Forget `job_run_id` (migration finished).
    pub fn clear(&mut self, job_run_id: &str) {
        self.entries.remove(job_run_id);
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, recorded_at)| recorded_at.elapsed() <= ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MigrationLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(app: &str) -> MigrationStage {
        MigrationStage::Created {
            application_id: app.to_string(),
        }
    }

    #[test]
    fn test_record_and_advance() {
        let mut ledger = MigrationLedger::new(Duration::from_secs(60));

        assert!(ledger.stage("run-1").is_none());

        ledger.record("run-1", created("app-new"));
        assert_eq!(ledger.stage("run-1"), Some(&created("app-new")));

        ledger.record(
            "run-1",
            MigrationStage::Triggered {
                application_id: "app-new".to_string(),
            },
        );
        let stage = ledger.stage("run-1").unwrap();
        assert!(matches!(stage, MigrationStage::Triggered { .. }));
        assert_eq!(stage.application_id(), "app-new");
        assert_eq!(ledger.len(), 1);

        ledger.clear("run-1");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_expired_entries_are_ignored_and_pruned() {
        let mut ledger = MigrationLedger::new(Duration::ZERO);
        ledger.record("run-1", created("app-new"));

        std::thread::sleep(Duration::from_millis(2));

        assert!(ledger.stage("run-1").is_none());
        assert_eq!(ledger.prune(), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_prune_keeps_live_entries() {
        let mut ledger = MigrationLedger::default();
        ledger.record("run-1", created("a"));
        ledger.record("run-2", created("b"));

        assert_eq!(ledger.prune(), 0);
        assert_eq!(ledger.len(), 2);
    }
}
