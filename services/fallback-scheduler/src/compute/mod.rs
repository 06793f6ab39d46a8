//! Compute platform client contract.
//!
//! The scheduler talks to the platform that runs jobs only through the
//! [`ComputeClient`] trait:
//! - Listing job runs for a source cluster/workspace (paginated)
//! - Fetching the deployment manifest of an application
//! - Creating an application from a manifest
//! - Triggering a job and terminating a job run
//!
//! Failures carry a typed [`FailureReason`] so callers can decide on retries
//! without inspecting messages.

pub mod http;

use async_trait::async_trait;
use fallback_reconcile::{JobRunPage, JobRunStatus};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpComputeClient;

/// Service credential used for every platform call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// How a failed platform call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The destination deployment exists but cannot be triggered yet.
    DeploymentNotReady,

    /// Network trouble, timeouts, throttling or server-side errors.
    Transient,

    /// Anything retrying will not fix.
    Fatal,
}

/// Compute platform errors.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// No active deployment to trigger yet.
    #[error("deployment not ready: {0}")]
    DeploymentNotReady(String),

    /// The per-call timeout elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response from the platform.
    #[error("platform returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl ComputeError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::DeploymentNotReady(_) => FailureReason::DeploymentNotReady,
            Self::Timeout(_) | Self::Network(_) => FailureReason::Transient,
            Self::Api { status, .. } if *status == 408 || *status == 429 || *status >= 500 => {
                FailureReason::Transient
            }
            Self::Api { .. } | Self::InvalidResponse(_) | Self::Setup(_) => FailureReason::Fatal,
        }
    }
}

/// Filter and window for a job-run listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRunQuery {
    pub statuses: Vec<JobRunStatus>,
    pub limit: u32,
    pub offset: u32,
}

/// A deployment as returned by the platform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deployment {
    pub manifest: Option<Value>,
}

/// Application creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    pub manifest: Value,
    pub dry_run: bool,
    pub force_deploy: bool,
    pub trigger_on_deploy: bool,
}

impl CreateApplicationRequest {
    /// A real (non-dry-run) forced deploy that does not trigger on its own.
    pub fn deploy(manifest: Value) -> Self {
        Self {
            manifest,
            dry_run: false,
            force_deploy: true,
            trigger_on_deploy: false,
        }
    }
}

/// The application a create call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedApplication {
    pub application_id: String,
}

/// Narrow client for the compute platform.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// List job runs in a cluster/workspace.
    async fn list_job_runs(
        &self,
        auth: &Credential,
        cluster_id: &str,
        workspace_id: &str,
        query: &JobRunQuery,
    ) -> Result<JobRunPage, ComputeError>;

    /// Fetch the deployment of `application_id`, optionally at `version`.
    async fn get_deployment_manifest(
        &self,
        auth: &Credential,
        application_id: &str,
        version: Option<&str>,
        tenant: &str,
    ) -> Result<Deployment, ComputeError>;

    /// Create (deploy) an application from a manifest.
    async fn create_application(
        &self,
        auth: &Credential,
        request: &CreateApplicationRequest,
        tenant: &str,
    ) -> Result<CreatedApplication, ComputeError>;

    /// Trigger a run of a job application.
    async fn trigger_job(
        &self,
        auth: &Credential,
        application_id: &str,
        input: Option<&Value>,
        tenant: &str,
    ) -> Result<(), ComputeError>;

    /// Terminate a job run.
    async fn terminate_job_run(
        &self,
        auth: &Credential,
        job_run_id: &str,
        job_run_name: &str,
        tenant: &str,
    ) -> Result<(), ComputeError>;
}
