//! Asynchronous job-queue adapter
//!
//! The node runs generation as a long-lived task: one POST creates it,
//! then the adapter polls its record until a terminal state. Terminal
//! states are exactly success, failed, and timeout; there is no path
//! back out of any of them.
//!
//! The node consumes the sketch by URL, so a [`SketchUploader`]
//! collaborator is a hard precondition; its absence is a configuration
//! error, not a retryable failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::traits::{GenerationBackend, GenerationRequest};
use crate::config::{PollConfig, Settings};
use crate::error::{ClientError, Result};
use crate::registry::Node;
use crate::upload::SketchUploader;

/// Adapter for nodes that queue generation as a pollable task.
pub struct JobBackend {
    node: Node,
    client: Client,
    uploader: Option<Arc<dyn SketchUploader>>,
    poll: PollConfig,
    probe_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct CreateTaskRequest {
    model: String,
    input: TaskInput,
}

#[derive(Debug, Serialize)]
struct TaskInput {
    prompt: String,
    image_urls: Vec<String>,
    output_format: &'static str,
    image_size: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<TaskRef>,
}

#[derive(Debug, Deserialize)]
struct TaskRef {
    #[serde(rename = "taskId")]
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskRecordResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<TaskRecord>,
}

#[derive(Debug, Deserialize)]
struct TaskRecord {
    state: TaskState,
    #[serde(rename = "resultJson", default)]
    result_json: Option<String>,
    #[serde(rename = "failMsg", default)]
    fail_msg: Option<String>,
}

/// Provider-reported task state. Anything unrecognized is treated as
/// still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TaskState {
    Pending,
    Processing,
    Success,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Payload embedded as a JSON string inside a successful record.
#[derive(Debug, Deserialize)]
struct TaskResultPayload {
    #[serde(rename = "resultUrls", default)]
    result_urls: Vec<String>,
}

impl JobBackend {
    pub fn new(
        node: Node,
        settings: &Settings,
        uploader: Option<Arc<dyn SketchUploader>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::Validation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            node,
            client,
            uploader,
            poll: settings.poll.clone(),
            probe_timeout: Duration::from_millis(settings.probe.timeout_ms),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.node.api_key().ok_or_else(|| {
            ClientError::Validation(format!("Node '{}' has no credential", self.node.id()))
        })
    }

    /// POST the task, returning its id.
    async fn create_task(
        &self,
        prompt: &str,
        image_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let body = CreateTaskRequest {
            model: self.node.model().to_string(),
            input: TaskInput {
                prompt: prompt.to_string(),
                image_urls: vec![image_url.to_string()],
                output_format: "png",
                image_size: "1:1",
            },
        };

        let url = format!("{}/jobs/createTask", self.node.base_url());
        let send = self
            .client
            .post(&url)
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            outcome = send => {
                outcome.map_err(|e| ClientError::Network(format!("Task creation failed: {}", e)))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::api(
                format!("Task creation failed with {}: {}", status, text),
                Some(status.as_u16()),
            ));
        }

        let payload: CreateTaskResponse = response
            .json()
            .await
            .map_err(|e| ClientError::api(format!("Malformed task creation response: {}", e), None))?;

        if payload.code != 200 {
            return Err(ClientError::api(
                format!("Task creation rejected: {}", payload.msg),
                None,
            ));
        }

        let task_id = payload
            .data
            .map(|d| d.task_id)
            .ok_or_else(|| ClientError::api("Task creation response carried no taskId", None))?;

        debug!(node = %self.node.id(), task_id = %task_id, "Created generation task");
        Ok(task_id)
    }

    /// GET the task's current record.
    async fn fetch_record(&self, task_id: &str, cancel: &CancellationToken) -> Result<TaskRecord> {
        let url = format!("{}/jobs/recordInfo", self.node.base_url());
        let send = self
            .client
            .get(&url)
            .query(&[("taskId", task_id)])
            .bearer_auth(self.api_key()?)
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            outcome = send => {
                outcome.map_err(|e| ClientError::Network(format!("Task query failed: {}", e)))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::api(
                format!("Task query failed with {}: {}", status, text),
                Some(status.as_u16()),
            ));
        }

        let payload: TaskRecordResponse = response
            .json()
            .await
            .map_err(|e| ClientError::api(format!("Malformed task record: {}", e), None))?;

        if payload.code != 200 {
            return Err(ClientError::api(
                format!("Task query rejected: {}", payload.msg),
                None,
            ));
        }

        payload
            .data
            .ok_or_else(|| ClientError::api("Task record carried no data", None))
    }

    /// Poll until the task reaches a terminal state.
    async fn poll_task(&self, task_id: &str, cancel: &CancellationToken) -> Result<String> {
        let started = Instant::now();
        let max_timeout = Duration::from_millis(self.poll.max_timeout_ms);

        sleep_or_cancel(Duration::from_millis(self.poll.initial_delay_ms), cancel).await?;

        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let elapsed = started.elapsed();
            if elapsed > max_timeout {
                return Err(ClientError::TaskTimeout {
                    task_id: task_id.to_string(),
                    elapsed,
                });
            }

            let record = self.fetch_record(task_id, cancel).await?;
            match record.state {
                TaskState::Success => {
                    return extract_result_url(record.result_json.as_deref());
                }
                TaskState::Failed => {
                    let reason = record.fail_msg.unwrap_or_else(|| "unknown error".to_string());
                    return Err(ClientError::api(format!("Task failed: {}", reason), None));
                }
                TaskState::Pending | TaskState::Processing | TaskState::Unknown => {
                    debug!(
                        node = %self.node.id(),
                        task_id = %task_id,
                        state = ?record.state,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Task still in progress"
                    );
                    sleep_or_cancel(Duration::from_millis(self.poll.interval_ms), cancel).await?;
                }
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for JobBackend {
    fn node_id(&self) -> &str {
        self.node.id()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let uploader = self.uploader.as_ref().ok_or_else(|| {
            ClientError::Validation(format!(
                "Node '{}' requires a publicly reachable sketch URL but no uploader is configured",
                self.node.id()
            ))
        })?;

        if request.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let image_url = uploader.upload(&request.sketch_data_url).await?;
        let task_id = self
            .create_task(&request.final_prompt, &image_url, &request.cancel)
            .await?;
        let result = self.poll_task(&task_id, &request.cancel).await?;

        info!(node = %self.node.id(), task_id = %task_id, "Generation task completed");
        Ok(result)
    }

    async fn probe(&self) -> Result<Duration> {
        crate::backend::measure_probe(&self.client, &self.node, self.probe_timeout).await
    }
}

/// A success state without a result URL is a provider contract violation.
fn extract_result_url(result_json: Option<&str>) -> Result<String> {
    let raw = result_json
        .ok_or_else(|| ClientError::api("Task succeeded but returned no result payload", None))?;

    let payload: TaskResultPayload = serde_json::from_str(raw)
        .map_err(|e| ClientError::api(format!("Malformed task result payload: {}", e), None))?;

    payload
        .result_urls
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::api("Task succeeded but returned no image URL", None))
}

/// Timer that aborts immediately when the user cancels.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
