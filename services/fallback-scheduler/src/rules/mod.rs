//! Fallback rule storage.
//!
//! Rules are created and edited by the configuration service; the scheduler
//! only ever lists them, once per cycle.

mod json_file;

use std::path::PathBuf;

use async_trait::async_trait;
use fallback_reconcile::FallbackRule;
use thiserror::Error;

pub use json_file::JsonFileRuleStore;

/// Rule store errors.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    /// The backing file could not be read.
    #[error("failed to read rules from {path:?}: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The backing file is not a valid rule list.
    #[error("failed to parse rules from {path:?}: {error}")]
    Parse {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },
}

/// Read access to the fallback rule collection.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// List every rule, in the store's order.
    async fn list_rules(&self) -> Result<Vec<FallbackRule>, RuleStoreError>;
}
