use crate::extract::extract_control_output;
use async_trait::async_trait;
use std::time::Duration;
use tandem_domain::{FieldMap, WorkflowCallError, WorkflowClient, WorkflowReply};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WorkflowClientConfig {
    /// Workflow run endpoint, e.g. `http://localhost:5001/v1/workflows/run`
    pub url: String,

    /// Static bearer credential.
    pub api_key: String,

    /// Static user identifier sent with every run.
    pub user_id: String,

    /// Bound on the whole request (default: 30 seconds)
    pub request_timeout: Duration,
}

/// `WorkflowClient` over HTTP.
///
/// Posts `{"inputs": <sensor>, "user": <user_id>}` and extracts the control
/// payload from the response body. Retry policy lives in the dispatcher, not
/// here; this client reports each call's outcome exactly once.
pub struct HttpWorkflowClient {
    client: reqwest::Client,
    config: WorkflowClientConfig,
}

impl HttpWorkflowClient {
    pub fn new(config: WorkflowClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl WorkflowClient for HttpWorkflowClient {
    async fn run_workflow(&self, sensor: &FieldMap) -> Result<WorkflowReply, WorkflowCallError> {
        let body = serde_json::json!({
            "inputs": sensor,
            "user": self.config.user_id,
        });

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowCallError::Http {
                status: status.as_u16(),
            });
        }

        let payload: serde_json::Value =
            response.json().await.map_err(map_transport_error)?;
        let control = extract_control_output(&payload);
        debug!(
            has_control = control.is_some(),
            url = %self.config.url,
            "workflow call completed"
        );

        Ok(WorkflowReply { control })
    }
}

fn map_transport_error(error: reqwest::Error) -> WorkflowCallError {
    if error.is_timeout() {
        WorkflowCallError::Timeout
    } else {
        WorkflowCallError::Connection(error.to_string())
    }
}

// The HTTP path itself is not unit tested here: reqwest errors cannot be
// constructed without a live socket. The dispatcher covers every outcome
// against a mocked client, and extract.rs covers response parsing.
