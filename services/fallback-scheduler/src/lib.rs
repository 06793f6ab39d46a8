//! Job fallback scheduler library.
//!
//! This crate primarily ships a `fallback-scheduler` binary, but we expose a
//! small library surface to enable integration testing and reuse.

pub mod compute;
pub mod config;
pub mod migration;
pub mod rules;
pub mod scheduler;

pub use compute::{ComputeClient, ComputeError, Credential, FailureReason, HttpComputeClient};
pub use config::{Config, ConfigError};
pub use migration::{MigrationError, MigrationExecutor, MigrationOutcome, MigrationSettings};
pub use rules::{JsonFileRuleStore, RuleStore, RuleStoreError};
pub use scheduler::{
    CycleOutcome, CycleStats, CycleTrigger, FallbackReconciler, FallbackWorker, PreviewReport,
    ReconcilerSettings, SchedulerError, SkipReason,
};
