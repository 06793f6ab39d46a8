//! Rule store backed by the configuration service's JSON file.
//!
//! The file holds an array of flat records:
//!
//! ```json
//! [{
//!   "id": "…",
//!   "sourceClusterId": "…", "sourceWorkspaceId": "…", "sourceJobId": null,
//!   "destinationClusterId": "…", "destinationWorkspaceId": "…",
//!   "destinationWorkspaceFqn": "…",
//!   "createdBy": null, "createdAt": "…", "updatedAt": "…"
//! }]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fallback_reconcile::{FallbackRule, RuleDestination, RuleSource};
use serde::Deserialize;
use tracing::debug;

use super::{RuleStore, RuleStoreError};

/// Reads rules from a JSON file on every call.
#[derive(Debug, Clone)]
pub struct JsonFileRuleStore {
    path: PathBuf,
}

impl JsonFileRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RuleStore for JsonFileRuleStore {
    async fn list_rules(&self) -> Result<Vec<FallbackRule>, RuleStoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "Rule file does not exist yet");
                return Ok(Vec::new());
            }
            Err(error) => {
                return Err(RuleStoreError::Read {
                    path: self.path.clone(),
                    error,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<RuleRecord> =
            serde_json::from_str(&contents).map_err(|error| RuleStoreError::Parse {
                path: self.path.clone(),
                error,
            })?;

        let mut rules: Vec<FallbackRule> = records.into_iter().map(FallbackRule::from).collect();
        // Newest first; stable so equal timestamps keep file order.
        rules.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        debug!(path = ?self.path, count = rules.len(), "Loaded fallback rules");
        Ok(rules)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleRecord {
    id: String,
    source_cluster_id: String,
    source_workspace_id: String,
    #[serde(default)]
    source_job_id: Option<String>,
    destination_cluster_id: String,
    destination_workspace_id: String,
    #[serde(default)]
    destination_workspace_fqn: Option<String>,
    #[serde(default)]
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl From<RuleRecord> for FallbackRule {
    fn from(record: RuleRecord) -> Self {
        Self {
            id: record.id,
            source: RuleSource {
                cluster_id: record.source_cluster_id,
                workspace_id: record.source_workspace_id,
                job_id: non_empty(record.source_job_id),
            },
            destination: RuleDestination {
                cluster_id: record.destination_cluster_id,
                workspace_id: record.destination_workspace_id,
                workspace_fqn: non_empty(record.destination_workspace_fqn),
            },
            created_by: non_empty(record.created_by),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
