//! Shared fixtures for the scheduler integration tests.
//!
//! `FakeCompute` is an in-memory compute platform that serves job-run pages
//! by offset, records every call, and replays scripted trigger/terminate
//! failures in order.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fallback_reconcile::{
    FallbackRule, JobRun, JobRunPage, JobRunStatus, RetryPolicy, RuleDestination, RuleSource,
};
use fallback_scheduler::compute::{
    ComputeClient, ComputeError, CreateApplicationRequest, CreatedApplication, Credential,
    Deployment, JobRunQuery,
};
use fallback_scheduler::rules::{RuleStore, RuleStoreError};
use fallback_scheduler::{FallbackReconciler, MigrationSettings, ReconcilerSettings};
use serde_json::{json, Value};
use tokio::sync::Notify;

pub const TENANT: &str = "acme";

/// A recorded platform call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List {
        cluster_id: String,
        workspace_id: String,
        statuses: Vec<JobRunStatus>,
        limit: u32,
        offset: u32,
    },
    GetManifest {
        application_id: String,
        version: Option<String>,
        tenant: String,
    },
    Create {
        manifest: Value,
        dry_run: bool,
        force_deploy: bool,
        trigger_on_deploy: bool,
        tenant: String,
    },
    Trigger {
        application_id: String,
        input: Option<Value>,
        tenant: String,
    },
    Terminate {
        job_run_id: String,
        job_run_name: String,
        tenant: String,
    },
}

#[derive(Default)]
struct FakeState {
    runs: BTreeMap<(String, String), Vec<JobRun>>,
    failing_locations: BTreeSet<(String, String)>,
    manifest_fetch_fails: bool,
    missing_manifest: bool,
    trigger_script: VecDeque<ComputeError>,
    terminate_script: VecDeque<ComputeError>,
    created: usize,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeCompute {
    state: Mutex<FakeState>,
}

impl FakeCompute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_runs(&self, cluster_id: &str, workspace_id: &str, runs: Vec<JobRun>) {
        self.state
            .lock()
            .unwrap()
            .runs
            .entry((cluster_id.to_string(), workspace_id.to_string()))
            .or_default()
            .extend(runs);
    }

    pub fn fail_listing(&self, cluster_id: &str, workspace_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_locations
            .insert((cluster_id.to_string(), workspace_id.to_string()));
    }

    pub fn fail_manifest_fetch(&self) {
        self.state.lock().unwrap().manifest_fetch_fails = true;
    }

    pub fn omit_manifest(&self) {
        self.state.lock().unwrap().missing_manifest = true;
    }

    /// Fail the next trigger calls with these errors, in order.
    pub fn script_trigger_failures(&self, errors: Vec<ComputeError>) {
        self.state.lock().unwrap().trigger_script.extend(errors);
    }

    /// Fail the next terminate calls with these errors, in order.
    pub fn script_terminate_failures(&self, errors: Vec<ComputeError>) {
        self.state.lock().unwrap().terminate_script.extend(errors);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn list_offsets(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::List { offset, .. } => Some(offset),
                _ => None,
            })
            .collect()
    }

    pub fn creates(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create { manifest, .. } => Some(manifest),
                _ => None,
            })
            .collect()
    }

    pub fn triggers(&self) -> Vec<(String, Option<Value>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Trigger {
                    application_id,
                    input,
                    ..
                } => Some((application_id, input)),
                _ => None,
            })
            .collect()
    }

    pub fn terminations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Terminate { job_run_id, .. } => Some(job_run_id),
                _ => None,
            })
            .collect()
    }

    pub fn manifest_fetches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::GetManifest { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ComputeClient for FakeCompute {
    async fn list_job_runs(
        &self,
        _auth: &Credential,
        cluster_id: &str,
        workspace_id: &str,
        query: &JobRunQuery,
    ) -> Result<JobRunPage, ComputeError> {
        self.record(Call::List {
            cluster_id: cluster_id.to_string(),
            workspace_id: workspace_id.to_string(),
            statuses: query.statuses.clone(),
            limit: query.limit,
            offset: query.offset,
        });

        let state = self.state.lock().unwrap();
        let key = (cluster_id.to_string(), workspace_id.to_string());
        if state.failing_locations.contains(&key) {
            return Err(ComputeError::Api {
                status: 403,
                message: "workspace access denied".to_string(),
            });
        }

        let all = state.runs.get(&key).cloned().unwrap_or_default();
        let start = (query.offset as usize).min(all.len());
        let end = (start + query.limit as usize).min(all.len());
        Ok(JobRunPage {
            runs: all[start..end].to_vec(),
            has_more: end < all.len(),
        })
    }

    async fn get_deployment_manifest(
        &self,
        _auth: &Credential,
        application_id: &str,
        version: Option<&str>,
        tenant: &str,
    ) -> Result<Deployment, ComputeError> {
        self.record(Call::GetManifest {
            application_id: application_id.to_string(),
            version: version.map(str::to_string),
            tenant: tenant.to_string(),
        });

        let state = self.state.lock().unwrap();
        if state.manifest_fetch_fails {
            return Err(ComputeError::Api {
                status: 404,
                message: "application not found".to_string(),
            });
        }
        if state.missing_manifest {
            return Ok(Deployment { manifest: None });
        }

        Ok(Deployment {
            manifest: Some(json!({
                "type": "job",
                "name": format!("{application_id}-job"),
                "workspace_fqn": "cluster-a:ws-a",
                "image": { "type": "image", "image_uri": "registry.example.com/etl:1.4" },
                "resources": { "cpu_request": 1, "memory_request": 1024 }
            })),
        })
    }

    async fn create_application(
        &self,
        _auth: &Credential,
        request: &CreateApplicationRequest,
        tenant: &str,
    ) -> Result<CreatedApplication, ComputeError> {
        self.record(Call::Create {
            manifest: request.manifest.clone(),
            dry_run: request.dry_run,
            force_deploy: request.force_deploy,
            trigger_on_deploy: request.trigger_on_deploy,
            tenant: tenant.to_string(),
        });

        let mut state = self.state.lock().unwrap();
        state.created += 1;
        Ok(CreatedApplication {
            application_id: format!("dest-app-{}", state.created),
        })
    }

    async fn trigger_job(
        &self,
        _auth: &Credential,
        application_id: &str,
        input: Option<&Value>,
        tenant: &str,
    ) -> Result<(), ComputeError> {
        self.record(Call::Trigger {
            application_id: application_id.to_string(),
            input: input.cloned(),
            tenant: tenant.to_string(),
        });

        match self.state.lock().unwrap().trigger_script.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn terminate_job_run(
        &self,
        _auth: &Credential,
        job_run_id: &str,
        job_run_name: &str,
        tenant: &str,
    ) -> Result<(), ComputeError> {
        self.record(Call::Terminate {
            job_run_id: job_run_id.to_string(),
            job_run_name: job_run_name.to_string(),
            tenant: tenant.to_string(),
        });

        match self.state.lock().unwrap().terminate_script.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Rules served from memory.
pub struct StaticRules(pub Vec<FallbackRule>);

#[async_trait]
impl RuleStore for StaticRules {
    async fn list_rules(&self) -> Result<Vec<FallbackRule>, RuleStoreError> {
        Ok(self.0.clone())
    }
}

/// Rules that are only returned once the test releases them.
pub struct GatedRules {
    pub rules: Vec<FallbackRule>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedRules {
    pub fn new(rules: Vec<FallbackRule>) -> Arc<Self> {
        Arc::new(Self {
            rules,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl RuleStore for GatedRules {
    async fn list_rules(&self) -> Result<Vec<FallbackRule>, RuleStoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.rules.clone())
    }
}

/// A rule store whose backing file cannot be read.
pub struct BrokenRules;

#[async_trait]
impl RuleStore for BrokenRules {
    async fn list_rules(&self) -> Result<Vec<FallbackRule>, RuleStoreError> {
        Err(RuleStoreError::Read {
            path: "/nonexistent/cluster-fallback-configs.json".into(),
            error: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

pub fn rule(
    id: &str,
    source: (&str, &str),
    job_id: Option<&str>,
    destination: (&str, &str),
    fqn: Option<&str>,
) -> FallbackRule {
    let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    FallbackRule {
        id: id.to_string(),
        source: RuleSource {
            cluster_id: source.0.to_string(),
            workspace_id: source.1.to_string(),
            job_id: job_id.map(str::to_string),
        },
        destination: RuleDestination {
            cluster_id: destination.0.to_string(),
            workspace_id: destination.1.to_string(),
            workspace_fqn: fqn.map(str::to_string),
        },
        created_by: None,
        created_at,
        updated_at: created_at,
    }
}

/// The common "A to B" rule.
pub fn generic_rule() -> FallbackRule {
    rule(
        "rule-generic",
        ("cluster-a", "ws-a"),
        None,
        ("cluster-b", "ws-b"),
        Some("b.fqn"),
    )
}

/// A CREATED run of `application_id` created `minutes_ago` minutes ago.
pub fn run(id: &str, application_id: &str, minutes_ago: i64) -> JobRun {
    JobRun {
        id: id.to_string(),
        name: format!("{application_id}-{id}"),
        application_id: application_id.to_string(),
        application_name: format!("{application_id}-nightly"),
        deployment_version: Some("7".to_string()),
        created_at: Utc::now().timestamp_millis() - minutes_ago * 60_000,
        command: Some(r#"{"date":"2026-10-01","mode":"full"}"#.to_string()),
        status: JobRunStatus::Created,
        tenant_name: Some(TENANT.to_string()),
    }
}

pub fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        enabled: true,
        stuck_threshold_minutes: 60,
        page_size: 100,
        migration: MigrationSettings {
            trigger_delay: Duration::from_secs(5),
            retry: RetryPolicy::fixed(3, Duration::from_secs(3)),
        },
        ledger_ttl: Duration::from_secs(60 * 60),
    }
}

pub fn reconciler(
    settings: ReconcilerSettings,
    rules: Arc<dyn RuleStore>,
    compute: Arc<FakeCompute>,
) -> FallbackReconciler {
    FallbackReconciler::new(settings, Some(Credential::new("svc-token")), rules, compute)
}

pub fn not_ready() -> ComputeError {
    ComputeError::DeploymentNotReady("Active deployment not found".to_string())
}
