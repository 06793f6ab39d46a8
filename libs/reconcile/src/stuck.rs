//! Stuck-job detection.

use crate::model::JobRun;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Whole minutes elapsed since the run was created (zero for future timestamps).
pub fn age_minutes(run: &JobRun, now_millis: i64) -> i64 {
    now_millis.saturating_sub(run.created_at).max(0) / MILLIS_PER_MINUTE
}

/// Returns true if the run is older than `threshold_minutes`.
///
/// The comparison is strict: a run exactly `threshold_minutes` old is not stuck.
pub fn is_stuck(run: &JobRun, now_millis: i64, threshold_minutes: u64) -> bool {
    let age_millis = i128::from(now_millis) - i128::from(run.created_at);
    age_millis > i128::from(threshold_minutes) * i128::from(MILLIS_PER_MINUTE)
}
