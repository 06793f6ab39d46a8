//! Dry-run report of what the next cycle would do.
//!
//! Reads rules and lists pending runs exactly like a cycle, but never calls
//! any mutating platform operation.

use chrono::Utc;
use fallback_reconcile::{age_minutes, group_rules, is_stuck, FallbackRule, Pager};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::reconciler::{FallbackReconciler, SchedulerError};

/// Preview output, serialized as JSON by the `preview` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReport {
    pub summary: PreviewSummary,
    pub rules: Vec<FallbackRule>,
    pub stuck_jobs: Vec<StuckJob>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_errors: Vec<SourceError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    pub total_rules: usize,
    pub unique_sources: usize,
    pub stuck_jobs_found: usize,
    pub stuck_threshold_minutes: u64,
}

/// A run the next cycle would consider stuck.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StuckJob {
    pub job_run_id: String,
    pub job_run_name: String,
    pub application_id: String,
    pub application_name: String,
    pub source_cluster_id: String,
    pub source_workspace_id: String,
    pub created_at: i64,
    pub stuck_minutes: i64,
    /// Rule that would govern the migration; absent when nothing matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_rule_id: Option<String>,
}

/// A source group whose runs could not be listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceError {
    pub source_cluster_id: String,
    pub source_workspace_id: String,
    pub error: String,
}

impl FallbackReconciler {
    /// Build a [`PreviewReport`] without migrating anything.
    ///
    /// Runs regardless of the enabled flag and does not take the cycle guard.
    #[instrument(skip(self))]
    pub async fn preview(&self) -> Result<PreviewReport, SchedulerError> {
        let auth = self.credential().ok_or(SchedulerError::MissingCredential)?;
        let threshold = self.settings().stuck_threshold_minutes;

        let rules = self.rule_store().list_rules().await?;
        let groups = group_rules(rules.iter().cloned());

        let mut stuck_jobs = Vec::new();
        let mut source_errors = Vec::new();

        for group in groups.values() {
            let mut pager = Pager::new(self.settings().page_size);
            loop {
                let page = match self.next_page(auth, &group.source, &mut pager).await {
                    Ok(Some(page)) => page,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(
                            source_cluster_id = %group.source.cluster_id,
                            source_workspace_id = %group.source.workspace_id,
                            error = %e,
                            "Failed to list job runs for preview"
                        );
                        source_errors.push(SourceError {
                            source_cluster_id: group.source.cluster_id.clone(),
                            source_workspace_id: group.source.workspace_id.clone(),
                            error: e.to_string(),
                        });
                        break;
                    }
                };

                let now = Utc::now().timestamp_millis();
                stuck_jobs.extend(page.iter().filter(|run| is_stuck(run, now, threshold)).map(
                    |run| StuckJob {
                        job_run_id: run.id.clone(),
                        job_run_name: run.name.clone(),
                        application_id: run.application_id.clone(),
                        application_name: run.application_name.clone(),
                        source_cluster_id: group.source.cluster_id.clone(),
                        source_workspace_id: group.source.workspace_id.clone(),
                        created_at: run.created_at,
                        stuck_minutes: age_minutes(run, now),
                        matching_rule_id: group.match_run(run).map(|rule| rule.id.clone()),
                    },
                ));
            }
        }

        info!(
            rule_count = rules.len(),
            source_count = groups.len(),
            stuck_jobs = stuck_jobs.len(),
            "Fallback preview complete"
        );

        Ok(PreviewReport {
            summary: PreviewSummary {
                total_rules: rules.len(),
                unique_sources: groups.len(),
                stuck_jobs_found: stuck_jobs.len(),
                stuck_threshold_minutes: threshold,
            },
            rules,
            stuck_jobs,
            source_errors,
        })
    }
}
