//! HTTP implementation of the compute client.

use async_trait::async_trait;
use fallback_reconcile::{JobRun, JobRunPage, JobRunStatus};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    ComputeClient, ComputeError, CreateApplicationRequest, CreatedApplication, Credential,
    Deployment, JobRunQuery,
};
use crate::config::ComputeConfig;

/// Header carrying the tenant a call is scoped to.
pub const TENANT_HEADER: &str = "x-tenant-name";

/// Error code the platform uses when a job has no active deployment yet.
const DEPLOYMENT_NOT_READY_CODE: &str = "ACTIVE_DEPLOYMENT_NOT_FOUND";
const DEPLOYMENT_NOT_READY_MESSAGE: &str = "active deployment not found";

/// Compute platform client over its REST API.
#[derive(Debug, Clone)]
pub struct HttpComputeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpComputeClient {
    pub fn new(config: &ComputeConfig) -> Result<Self, ComputeError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ComputeError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        auth: &Credential,
        tenant: Option<&str>,
    ) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(AUTHORIZATION, auth.bearer());
        if let Some(tenant) = tenant {
            request = request.header(TENANT_HEADER, tenant);
        }
        request
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ComputeError> {
        let response = request.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ComputeError::InvalidResponse(e.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ComputeError> {
        let response = request.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn list_job_runs(
        &self,
        auth: &Credential,
        cluster_id: &str,
        workspace_id: &str,
        query: &JobRunQuery,
    ) -> Result<JobRunPage, ComputeError> {
        let mut params: Vec<(&str, String)> = vec![
            ("clusterId", cluster_id.to_string()),
            ("workspaceId", workspace_id.to_string()),
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        params.extend(
            query
                .statuses
                .iter()
                .map(|status| ("status", status.as_str().to_string())),
        );

        debug!(cluster_id, workspace_id, offset = query.offset, "Listing job runs");
        let request = self
            .request(Method::GET, "/api/svc/v1/job-runs", auth, None)
            .query(&params);
        let body: JobRunListResponse = self.send_json(request).await?;

        let has_more = body.pagination.has_more(query.offset, body.data.len());
        Ok(JobRunPage {
            runs: body.data.into_iter().map(JobRun::from).collect(),
            has_more,
        })
    }

    async fn get_deployment_manifest(
        &self,
        auth: &Credential,
        application_id: &str,
        version: Option<&str>,
        tenant: &str,
    ) -> Result<Deployment, ComputeError> {
        let path = format!("/api/svc/v1/apps/{application_id}/deployment");
        let mut request = self.request(Method::GET, &path, auth, Some(tenant));
        if let Some(version) = version {
            request = request.query(&[("version", version)]);
        }

        let body: DeploymentResponse = self.send_json(request).await?;
        Ok(Deployment {
            manifest: body.manifest.filter(|m| !m.is_null()),
        })
    }

    async fn create_application(
        &self,
        auth: &Credential,
        request: &CreateApplicationRequest,
        tenant: &str,
    ) -> Result<CreatedApplication, ComputeError> {
        let http = self
            .request(Method::PUT, "/api/svc/v1/apps", auth, Some(tenant))
            .json(request);
        let body: CreateApplicationResponse = self.send_json(http).await?;

        // Prefer the application id; older platform versions only echo it on the deployment.
        let application_id = body
            .application
            .map(|app| app.id)
            .or(body.deployment.and_then(|d| d.application_id))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ComputeError::InvalidResponse("create response has no application id".to_string())
            })?;

        Ok(CreatedApplication { application_id })
    }

    async fn trigger_job(
        &self,
        auth: &Credential,
        application_id: &str,
        input: Option<&Value>,
        tenant: &str,
    ) -> Result<(), ComputeError> {
        let body = TriggerJobRequest {
            application_id,
            input,
        };
        let request = self
            .request(Method::POST, "/api/svc/v1/jobs/trigger", auth, Some(tenant))
            .json(&body);
        self.send_empty(request).await
    }

    async fn terminate_job_run(
        &self,
        auth: &Credential,
        job_run_id: &str,
        job_run_name: &str,
        tenant: &str,
    ) -> Result<(), ComputeError> {
        let request = self
            .request(Method::POST, "/api/svc/v1/jobs/terminate", auth, Some(tenant))
            .query(&[("deploymentId", job_run_id), ("jobRunName", job_run_name)]);
        self.send_empty(request).await
    }
}

fn transport_error(e: reqwest::Error) -> ComputeError {
    if e.is_timeout() {
        ComputeError::Timeout(e.to_string())
    } else {
        ComputeError::Network(e.to_string())
    }
}

async fn error_from_response(response: Response) -> ComputeError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or(text);

    let not_ready = body.code.as_deref() == Some(DEPLOYMENT_NOT_READY_CODE)
        || message.to_lowercase().contains(DEPLOYMENT_NOT_READY_MESSAGE);
    if not_ready && (400..500).contains(&status) {
        return ComputeError::DeploymentNotReady(message);
    }

    ComputeError::Api { status, message }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobRunListResponse {
    #[serde(default)]
    data: Vec<WireJobRun>,
    #[serde(default)]
    pagination: WirePagination,
}

/// The platform reports either an explicit flag or a total count.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePagination {
    #[serde(default)]
    has_more: Option<bool>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    offset: Option<u64>,
}

impl WirePagination {
    fn has_more(&self, requested_offset: u32, returned: usize) -> bool {
        if let Some(has_more) = self.has_more {
            return has_more;
        }
        match self.total {
            Some(total) => {
                let offset = self.offset.unwrap_or(u64::from(requested_offset));
                offset + (returned as u64) < total
            }
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJobRun {
    id: String,
    name: String,
    application_id: String,
    application_name: String,
    #[serde(default)]
    deployment_version: Option<Value>,
    created_at: i64,
    #[serde(default)]
    command: Option<String>,
    status: JobRunStatus,
    #[serde(default)]
    tenant_name: Option<String>,
}

impl From<WireJobRun> for JobRun {
    fn from(run: WireJobRun) -> Self {
        // Versions arrive as numbers or strings depending on the endpoint.
        let deployment_version = match run.deployment_version {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self {
            id: run.id,
            name: run.name,
            application_id: run.application_id,
            application_name: run.application_name,
            deployment_version,
            created_at: run.created_at,
            command: run.command,
            status: run.status,
            tenant_name: run.tenant_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    #[serde(default)]
    manifest: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CreateApplicationResponse {
    #[serde(default)]
    application: Option<WireApplication>,
    #[serde(default)]
    deployment: Option<WireDeploymentRef>,
}

#[derive(Debug, Deserialize)]
struct WireApplication {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDeploymentRef {
    #[serde(default)]
    application_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerJobRequest<'a> {
    application_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<&'a Value>,
}
