use crate::types::FieldMap;
use async_trait::async_trait;
use thiserror::Error;

/// Outcome of one workflow invocation that reached the server and returned
/// an HTTP 200.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowReply {
    /// Extracted control payload; `None` when the workflow ran but produced
    /// no usable control output.
    pub control: Option<FieldMap>,
}

/// Transport-level failure of a workflow invocation. The dispatcher decides
/// what each variant means for the in-flight marker.
#[derive(Error, Debug)]
pub enum WorkflowCallError {
    /// The request timed out. The call may still be executing server-side.
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("connection failed: {0}")]
    Connection(String),
}

/// Client for the external decision workflow.
/// Infrastructure (tandem-workflow) implements this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Run the workflow for one sensor reading.
    async fn run_workflow(&self, sensor: &FieldMap) -> Result<WorkflowReply, WorkflowCallError>;
}
