pub mod correlate;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod store;
pub mod ttl_set;
pub mod types;
pub mod workflow;

pub use correlate::CorrelationService;
pub use dispatch::{DispatchConfig, DispatchOutcome, WorkflowDispatchService};
pub use error::{DomainError, DomainResult};
pub use fingerprint::{fingerprint, Fingerprint};
pub use store::ControlLogStore;
pub use ttl_set::TtlSet;
pub use types::{is_falsy, FieldMap, LogEntry, LogSource};
pub use workflow::{WorkflowCallError, WorkflowClient, WorkflowReply};
