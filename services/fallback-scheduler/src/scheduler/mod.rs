//! Fallback scheduler.
//!
//! The scheduler is responsible for:
//! - Running a reconciliation cycle on a fixed interval, one at a time
//! - Detecting stuck job runs in every source that has fallback rules
//! - Handing each stuck run to the migration executor
//! - Producing a side-effect-free preview of the next cycle

mod preview;
mod reconciler;
mod worker;

pub use preview::{PreviewReport, PreviewSummary, SourceError, StuckJob};
pub use reconciler::{
    CycleOutcome, CycleStats, CycleTrigger, FallbackReconciler, ReconcilerSettings,
    SchedulerError, SkipReason,
};
pub use worker::FallbackWorker;
