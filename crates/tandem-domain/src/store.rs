use crate::error::DomainResult;
use crate::types::{FieldMap, LogEntry};
use async_trait::async_trait;

/// Durable append-only store for committed (sensor, control) pairs.
/// Infrastructure (tandem-store) implements this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlLogStore: Send + Sync {
    /// Append an entry and persist the retained window.
    ///
    /// A persistence failure keeps the entry in memory and is reported as
    /// `DomainError::LogPersistence`; the next successful append rewrites
    /// the whole retained window.
    async fn append(&self, entry: LogEntry) -> DomainResult<()>;

    /// Retained entries, oldest first.
    async fn entries(&self) -> Vec<LogEntry>;

    /// Sensor snapshots of the retained entries, oldest first.
    async fn history(&self) -> Vec<FieldMap>;
}
