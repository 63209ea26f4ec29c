//! Upstream scheduler gateway
//!
//! The coordinator signals the workflow scheduler (retry requests) and reads
//! back task status for retry verification. The scheduler owns its own
//! retry/backoff policy; this side only fires signals and observes.

use async_trait::async_trait;
use mend_common::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Task state as reported by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Queued,
    Running,
    Success,
    Failed,
}

/// Capability interface to the upstream scheduler
///
/// Substitutable for tests; the production implementation talks HTTP.
#[async_trait]
pub trait SchedulerGateway: Send + Sync {
    /// Ask the scheduler to re-run a failed task (fire-and-forget)
    async fn request_retry(&self, pipeline_id: &str, task_id: &str) -> Result<()>;

    /// Read back the task's current status
    async fn task_status(&self, pipeline_id: &str, task_id: &str) -> Result<TaskRunStatus>;
}

/// HTTP implementation of the scheduler gateway
pub struct HttpScheduler {
    base_url: String,
    client: reqwest::Client,
}

impl HttpScheduler {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: TaskRunStatus,
}

#[async_trait]
impl SchedulerGateway for HttpScheduler {
    async fn request_retry(&self, pipeline_id: &str, task_id: &str) -> Result<()> {
        let url = format!(
            "{}/api/v1/pipelines/{}/tasks/{}/retries",
            self.base_url, pipeline_id, task_id
        );
        info!(%pipeline_id, %task_id, "Requesting task retry from scheduler");

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::Execution(format!("scheduler unreachable: {}", e)))?;
        response
            .error_for_status()
            .map_err(|e| Error::Execution(format!("scheduler rejected retry request: {}", e)))?;
        Ok(())
    }

    async fn task_status(&self, pipeline_id: &str, task_id: &str) -> Result<TaskRunStatus> {
        let url = format!(
            "{}/api/v1/pipelines/{}/tasks/{}/status",
            self.base_url, pipeline_id, task_id
        );
        debug!(%pipeline_id, %task_id, "Reading task status from scheduler");

        let response: StatusResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Execution(format!("scheduler unreachable: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::Execution(format!("scheduler status request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::Execution(format!("malformed scheduler status: {}", e)))?;
        Ok(response.status)
    }
}
