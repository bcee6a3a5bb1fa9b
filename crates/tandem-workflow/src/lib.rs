pub mod extract;
pub mod http_client;

pub use extract::extract_control_output;
pub use http_client::{HttpWorkflowClient, WorkflowClientConfig};
