//! Migration of a stuck job run to its fallback destination.
//!
//! A migration runs these steps in order, each a call to the compute platform:
//! 1. Fetch the deployment manifest of the stuck run's application
//! 2. Create a renamed copy of the application in the destination workspace
//! 3. Wait for the destination deployment to settle
//! 4. Trigger the copy with the original run's input (retried while the
//!    deployment is not ready)
//! 5. Terminate the original run (retried on any failure)
//!
//! Failures are logged and reported as a [`MigrationOutcome`]; nothing is
//! rolled back. Progress past step 2 is kept in a [`MigrationLedger`] so a
//! later cycle resumes instead of creating a second copy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fallback_reconcile::{
    fallback_name, retarget_manifest, FallbackRule, JobRun, MigrationLedger, MigrationStage,
    ReconcileError, RetryPolicy,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::compute::{
    ComputeClient, ComputeError, CreateApplicationRequest, Credential, FailureReason,
};

/// Errors that abort a single migration.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("job run {0} has no tenant")]
    MissingTenant(String),

    #[error("failed to fetch deployment manifest: {0}")]
    FetchManifest(#[source] ComputeError),

    #[error("no manifest found for application {0}")]
    MissingManifest(String),

    #[error(transparent)]
    Invalid(#[from] ReconcileError),

    #[error("failed to create application on destination: {0}")]
    CreateApplication(#[source] ComputeError),

    #[error("failed to trigger application {application_id} after {attempts} attempt(s): {error}")]
    Trigger {
        application_id: String,
        attempts: u32,
        #[source]
        error: ComputeError,
    },

    #[error("failed to terminate job run {job_run_id} after {attempts} attempt(s): {error}")]
    Terminate {
        job_run_id: String,
        attempts: u32,
        #[source]
        error: ComputeError,
    },
}

impl MigrationError {
    /// Step the migration stopped at.
    pub fn step(&self) -> &'static str {
        match self {
            Self::MissingTenant(_) => "resolve_tenant",
            Self::FetchManifest(_) | Self::MissingManifest(_) => "fetch_manifest",
            Self::Invalid(_) => "prepare_manifest",
            Self::CreateApplication(_) => "create_application",
            Self::Trigger { .. } => "trigger",
            Self::Terminate { .. } => "terminate",
        }
    }
}

/// Result of one migration attempt.
#[derive(Debug)]
pub enum MigrationOutcome {
    /// Destination job triggered and source run terminated.
    Completed { application_id: String },

    /// The migration stopped early. Earlier steps are not undone.
    Failed(MigrationError),
}

impl MigrationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Migration timing and retry settings.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Wait between creating the destination application and the first trigger.
    pub trigger_delay: Duration,

    /// Shared by the trigger and terminate steps.
    pub retry: RetryPolicy,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            trigger_delay: fallback_reconcile::DEFAULT_TRIGGER_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Executes migrations against the compute platform.
pub struct MigrationExecutor {
    client: Arc<dyn ComputeClient>,
    settings: MigrationSettings,
    ledger: Mutex<MigrationLedger>,
}

impl MigrationExecutor {
    pub fn new(
        client: Arc<dyn ComputeClient>,
        settings: MigrationSettings,
        ledger: MigrationLedger,
    ) -> Self {
        Self {
            client,
            settings,
            ledger: Mutex::new(ledger),
        }
    }

    /// Drop expired ledger entries.
    pub async fn prune_ledger(&self) {
        let pruned = self.ledger.lock().await.prune();
        if pruned > 0 {
            debug!(pruned, "Pruned expired migration ledger entries");
        }
    }

    /// Ledger stage recorded for a job run, if any.
    pub async fn ledger_stage(&self, job_run_id: &str) -> Option<MigrationStage> {
        self.ledger.lock().await.stage(job_run_id).cloned()
    }

    /// Move `run` to the destination of `rule`. Never fails past this call;
    /// errors are logged and returned in the outcome.
    #[instrument(
        skip_all,
        fields(
            job_run_id = %run.id,
            job_run = %run.name,
            application_id = %run.application_id,
            rule_id = %rule.id,
        )
    )]
    pub async fn migrate(
        &self,
        auth: &Credential,
        run: &JobRun,
        rule: &FallbackRule,
    ) -> MigrationOutcome {
        info!(
            tenant = run.tenant_name.as_deref().unwrap_or(""),
            source_cluster_id = %rule.source.cluster_id,
            source_workspace_id = %rule.source.workspace_id,
            destination_cluster_id = %rule.destination.cluster_id,
            destination_workspace_id = %rule.destination.workspace_id,
            "Moving stuck job to destination"
        );

        match self.run_steps(auth, run, rule).await {
            Ok(application_id) => {
                info!(
                    destination_application_id = %application_id,
                    "Stuck job moved to destination"
                );
                MigrationOutcome::Completed { application_id }
            }
            Err(e) => {
                error!(step = e.step(), error = %e, "Failed to move job to destination");
                MigrationOutcome::Failed(e)
            }
        }
    }

    async fn run_steps(
        &self,
        auth: &Credential,
        run: &JobRun,
        rule: &FallbackRule,
    ) -> Result<String, MigrationError> {
        let tenant = run
            .tenant_name
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MigrationError::MissingTenant(run.name.clone()))?;

        let application_id = match self.ledger_stage(&run.id).await {
            Some(MigrationStage::Triggered { application_id }) => {
                info!(
                    destination_application_id = %application_id,
                    "Destination already triggered; resuming at termination"
                );
                self.terminate(auth, run, tenant).await?;
                self.ledger.lock().await.clear(&run.id);
                return Ok(application_id);
            }
            Some(MigrationStage::Created { application_id }) => {
                info!(
                    destination_application_id = %application_id,
                    "Destination already created; resuming at trigger"
                );
                application_id
            }
            None => {
                let application_id = self.create_on_destination(auth, run, rule, tenant).await?;
                self.ledger.lock().await.record(
                    &run.id,
                    MigrationStage::Created {
                        application_id: application_id.clone(),
                    },
                );

                debug!(
                    delay_ms = self.settings.trigger_delay.as_millis() as u64,
                    "Waiting before triggering job on destination"
                );
                tokio::time::sleep(self.settings.trigger_delay).await;
                application_id
            }
        };

        let input = trigger_input(run);
        self.trigger(auth, &application_id, input.as_ref(), tenant)
            .await?;
        self.ledger.lock().await.record(
            &run.id,
            MigrationStage::Triggered {
                application_id: application_id.clone(),
            },
        );

        self.terminate(auth, run, tenant).await?;
        self.ledger.lock().await.clear(&run.id);

        Ok(application_id)
    }

    /// Fetch the manifest, retarget it and create the copy. Returns the new
    /// application id.
    async fn create_on_destination(
        &self,
        auth: &Credential,
        run: &JobRun,
        rule: &FallbackRule,
        tenant: &str,
    ) -> Result<String, MigrationError> {
        let deployment = self
            .client
            .get_deployment_manifest(
                auth,
                &run.application_id,
                run.deployment_version.as_deref(),
                tenant,
            )
            .await
            .map_err(MigrationError::FetchManifest)?;
        let manifest = deployment
            .manifest
            .ok_or_else(|| MigrationError::MissingManifest(run.application_id.clone()))?;

        let workspace_fqn = rule
            .destination_fqn()
            .ok_or_else(|| ReconcileError::IncompleteRule {
                rule_id: rule.id.clone(),
                reason: format!(
                    "no workspace FQN stored for destination workspace {}",
                    rule.destination.workspace_id
                ),
            })?;

        let name = fallback_name(&run.application_name);
        let manifest = retarget_manifest(&manifest, &name, workspace_fqn)?;

        let created = self
            .client
            .create_application(auth, &CreateApplicationRequest::deploy(manifest), tenant)
            .await
            .map_err(MigrationError::CreateApplication)?;

        info!(
            destination_application_id = %created.application_id,
            deployment_name = %name,
            workspace_fqn,
            "Created application on destination"
        );
        Ok(created.application_id)
    }

    async fn trigger(
        &self,
        auth: &Credential,
        application_id: &str,
        input: Option<&Value>,
        tenant: &str,
    ) -> Result<(), MigrationError> {
        let client = &self.client;
        with_retry(
            self.settings.retry,
            "trigger",
            |e| e.reason() == FailureReason::DeploymentNotReady,
            || client.trigger_job(auth, application_id, input, tenant),
        )
        .await
        .map_err(|(attempts, error)| MigrationError::Trigger {
            application_id: application_id.to_string(),
            attempts,
            error,
        })?;

        info!(destination_application_id = %application_id, "Triggered job on destination");
        Ok(())
    }

    async fn terminate(
        &self,
        auth: &Credential,
        run: &JobRun,
        tenant: &str,
    ) -> Result<(), MigrationError> {
        let client = &self.client;
        with_retry(
            self.settings.retry,
            "terminate",
            |_| true,
            || client.terminate_job_run(auth, &run.id, &run.name, tenant),
        )
        .await
        .map_err(|(attempts, error)| MigrationError::Terminate {
            job_run_id: run.id.clone(),
            attempts,
            error,
        })?;

        info!("Terminated stuck job on source");
        Ok(())
    }
}

/// Parse the run's command as the trigger input. Commands that are not valid
/// JSON trigger without input.
fn trigger_input(run: &JobRun) -> Option<Value> {
    let command = run.command.as_deref().filter(|c| !c.trim().is_empty())?;
    match serde_json::from_str::<Value>(command) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Failed to parse job command as JSON; triggering without input");
            None
        }
    }
}

/// Run `op` until it succeeds, the policy is exhausted, or `retryable`
/// rejects the error. Returns the attempt count with the last error.
async fn with_retry<T, F, Fut, R>(
    policy: RetryPolicy,
    operation: &'static str,
    retryable: R,
    mut op: F,
) -> Result<T, (u32, ComputeError)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ComputeError>>,
    R: Fn(&ComputeError) -> bool,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if policy.should_retry(attempt, retryable(&e)) => {
                debug!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = policy.delay().as_millis() as u64,
                    error = %e,
                    "Retrying platform call"
                );
                tokio::time::sleep(policy.delay()).await;
                attempt += 1;
            }
            Err(e) => return Err((attempt, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fallback_reconcile::JobRunStatus;

    fn run_with_command(command: Option<&str>) -> JobRun {
        JobRun {
            id: "run-1".to_string(),
            name: "etl-run-1".to_string(),
            application_id: "app1".to_string(),
            application_name: "etl".to_string(),
            deployment_version: None,
            created_at: 0,
            command: command.map(str::to_string),
            status: JobRunStatus::Created,
            tenant_name: Some("acme".to_string()),
        }
    }

    #[test]
    fn test_trigger_input_parsing() {
        let input = trigger_input(&run_with_command(Some(r#"{"date":"2026-10-01"}"#)));
        assert_eq!(input.unwrap()["date"], "2026-10-01");

        assert!(trigger_input(&run_with_command(None)).is_none());
        assert!(trigger_input(&run_with_command(Some("  "))).is_none());
        assert!(trigger_input(&run_with_command(Some("python main.py"))).is_none());
    }

    #[test]
    fn test_trigger_input_forwards_any_json_value() {
        let array = trigger_input(&run_with_command(Some("[1,2]")));
        assert_eq!(array, Some(serde_json::json!([1, 2])));

        let string = trigger_input(&run_with_command(Some(r#""full""#)));
        assert_eq!(string, Some(Value::String("full".to_string())));

        let number = trigger_input(&run_with_command(Some("42")));
        assert_eq!(number, Some(serde_json::json!(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_stops_on_non_retryable() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(
            RetryPolicy::fixed(3, Duration::from_secs(3)),
            "test",
            |e| e.reason() == FailureReason::DeploymentNotReady,
            || {
                calls += 1;
                async { Err(ComputeError::Network("down".to_string())) }
            },
        )
        .await;

        let (attempts, error) = result.unwrap_err();
        assert_eq!(attempts, 1);
        assert_eq!(calls, 1);
        assert!(matches!(error, ComputeError::Network(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts_policy() {
        let mut calls = 0;
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = with_retry(
            RetryPolicy::fixed(3, Duration::from_secs(3)),
            "test",
            |_| true,
            || {
                calls += 1;
                async { Err(ComputeError::Timeout("slow".to_string())) }
            },
        )
        .await;

        assert_eq!(result.unwrap_err().0, 3);
        assert_eq!(calls, 3);
        // Two waits between three attempts.
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert!(start.elapsed() < Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_succeeds_after_retry() {
        let mut calls = 0;
        let result = with_retry(
            RetryPolicy::fixed(3, Duration::from_millis(10)),
            "test",
            |_| true,
            || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 2 {
                        Err(ComputeError::Network("blip".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 2);
    }
}
