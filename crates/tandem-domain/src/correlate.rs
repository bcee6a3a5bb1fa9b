use crate::dispatch::{DispatchOutcome, WorkflowDispatchService};
use crate::error::DomainResult;
use crate::fingerprint::fingerprint;
use crate::store::ControlLogStore;
use crate::ttl_set::TtlSet;
use crate::types::{is_falsy, FieldMap, LogEntry, LogSource};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Pairs the two bus streams.
///
/// Sensor events replace the single-slot "latest reading" (last-write-wins,
/// no history) and drive the dispatcher. Control events are recorded against
/// whatever reading is cached at that moment; with racing streams that is
/// best-effort pairing, accepted by design.
pub struct CorrelationService {
    dispatcher: Arc<WorkflowDispatchService>,
    store: Arc<dyn ControlLogStore>,
    recent_success: Arc<TtlSet>,
    latest_reading: RwLock<Option<FieldMap>>,
}

impl CorrelationService {
    pub fn new(
        dispatcher: Arc<WorkflowDispatchService>,
        store: Arc<dyn ControlLogStore>,
        recent_success: Arc<TtlSet>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            recent_success,
            latest_reading: RwLock::new(None),
        }
    }

    /// Latest sensor reading, if any has arrived since startup.
    pub async fn latest_reading(&self) -> Option<FieldMap> {
        self.latest_reading.read().await.clone()
    }

    /// A sensor reading arrived: cache it, then run the workflow for it.
    ///
    /// Callers run this in its own task per bus message; the workflow call
    /// and its backoff sleeps block only that task.
    pub async fn handle_sensor_event(&self, reading: FieldMap) {
        debug!(field_count = reading.len(), "received sensor reading");
        {
            let mut slot = self.latest_reading.write().await;
            *slot = Some(reading.clone());
        }
        self.run_dispatch(reading).await;
    }

    /// A control command arrived on the bus.
    ///
    /// Empty commands are not logged; they re-trigger the workflow for the
    /// cached reading instead, since the decision evidently produced no
    /// usable output. Non-empty commands are logged unless the workflow
    /// path already committed the same pair within the suppression window.
    pub async fn handle_control_event(&self, command: FieldMap) -> DomainResult<()> {
        if is_empty_control(&command) {
            match self.latest_reading().await {
                Some(reading) => {
                    info!("empty control command, re-running workflow for cached reading");
                    self.run_dispatch(reading).await;
                }
                None => {
                    warn!("empty control command and no sensor reading cached, dropping");
                }
            }
            return Ok(());
        }

        let sensor = self.latest_reading().await.unwrap_or_default();
        let pair_fp = fingerprint(&sensor, Some(&command))?;
        if self.recent_success.contains_live(&pair_fp).await {
            debug!(fingerprint = %pair_fp, "control command already recorded via workflow path");
            return Ok(());
        }

        self.store
            .append(LogEntry::new(sensor, command, LogSource::Mqtt))
            .await
    }

    async fn run_dispatch(&self, reading: FieldMap) {
        match self.dispatcher.dispatch(reading).await {
            Ok(DispatchOutcome::Logged) => {}
            Ok(DispatchOutcome::DuplicateSuppressed) => {
                debug!("dispatch suppressed, identical reading in flight");
            }
            Ok(DispatchOutcome::TimedOutHeld) => {
                warn!("workflow call timed out, marker held until TTL expiry");
            }
            Err(e) => {
                warn!(error = %e, "workflow dispatch failed");
            }
        }
    }
}

/// A command is empty when it has no keys or every value is falsy. This
/// covers the raw-wrapper case `{"raw": ""}` produced for blank payloads.
fn is_empty_control(command: &FieldMap) -> bool {
    command.values().all(is_falsy)
}
