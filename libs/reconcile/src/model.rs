//! Data model shared by the scheduler and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a rule applies: a cluster/workspace, optionally narrowed to one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSource {
    pub cluster_id: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// Where stuck jobs are relocated to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDestination {
    pub cluster_id: String,
    pub workspace_id: String,

    /// Fully-qualified workspace name understood by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_fqn: Option<String>,
}

/// A stored mapping from a source location to a destination location.
///
/// Rules are read-only here; they are managed by the configuration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRule {
    pub id: String,
    pub source: RuleSource,
    pub destination: RuleDestination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FallbackRule {
    /// The job this rule is scoped to, if any.
    ///
    /// An empty job id is treated the same as no job id.
    pub fn scoped_job_id(&self) -> Option<&str> {
        self.source.job_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns true if the rule applies to every job in its source.
    pub fn is_generic(&self) -> bool {
        self.scoped_job_id().is_none()
    }

    /// Destination workspace FQN, if the rule carries a non-empty one.
    pub fn destination_fqn(&self) -> Option<&str> {
        self.destination
            .workspace_fqn
            .as_deref()
            .filter(|fqn| !fqn.is_empty())
    }
}

/// Job run lifecycle status as reported by the compute platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRunStatus {
    Created,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobRunStatus {
    /// Statuses that are evaluated for staleness.
    pub const PENDING: [JobRunStatus; 2] = [JobRunStatus::Created, JobRunStatus::Scheduled];

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Returns true if the run has not started executing yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Created | Self::Scheduled)
    }
}

impl std::fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single run of a job on the compute platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: String,
    pub name: String,
    pub application_id: String,
    pub application_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_version: Option<String>,

    /// Creation time in epoch milliseconds.
    pub created_at: i64,

    /// Serialized input payload the run was triggered with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub status: JobRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
}

/// One page of job runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRunPage {
    pub runs: Vec<JobRun>,
    pub has_more: bool,
}
