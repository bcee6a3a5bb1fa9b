use crate::error::{truncate_error_text, DomainError, DomainResult};
use crate::fingerprint::fingerprint;
use crate::store::ControlLogStore;
use crate::ttl_set::TtlSet;
use crate::types::{FieldMap, LogEntry, LogSource};
use crate::workflow::{WorkflowCallError, WorkflowClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Characters of error text kept for operator-facing logs.
const ERROR_TEXT_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Retries when the workflow succeeds but returns no control output
    /// (default: 3)
    pub max_empty_retries: u32,

    /// Retries when the workflow answers HTTP 429 (default: 2)
    pub rate_limit_max_retries: u32,

    /// Cap on the exponential backoff between retries (default: 30 seconds)
    pub backoff_cap_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_empty_retries: 3,
            rate_limit_max_retries: 2,
            backoff_cap_secs: 30,
        }
    }
}

/// Non-error terminal states of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The workflow produced a control command and the pair was logged.
    Logged,
    /// An identical reading is already in flight; no call was made.
    DuplicateSuppressed,
    /// The request timed out. The in-flight marker is deliberately kept
    /// until its TTL expires: the call may still complete server-side, and
    /// retriggering before then would risk a duplicate decision.
    TimedOutHeld,
}

/// Drives the decision workflow for one sensor reading and commits the
/// resulting pair.
///
/// Flow:
/// 1. Fingerprint the reading; a live in-flight entry suppresses the call
/// 2. Mark in-flight, invoke the workflow with retry/backoff
/// 3. On success, append to the control log and cache the pair fingerprint
///    so the echoed bus command is not recorded twice
pub struct WorkflowDispatchService {
    workflow: Arc<dyn WorkflowClient>,
    store: Arc<dyn ControlLogStore>,
    in_flight: Arc<TtlSet>,
    recent_success: Arc<TtlSet>,
    config: DispatchConfig,
}

impl WorkflowDispatchService {
    pub fn new(
        workflow: Arc<dyn WorkflowClient>,
        store: Arc<dyn ControlLogStore>,
        in_flight: Arc<TtlSet>,
        recent_success: Arc<TtlSet>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            workflow,
            store,
            in_flight,
            recent_success,
            config,
        }
    }

    /// Run the workflow for `sensor` unless an identical reading is already
    /// in flight.
    pub async fn dispatch(&self, sensor: FieldMap) -> DomainResult<DispatchOutcome> {
        let sensor_fp = fingerprint(&sensor, None)?;

        if self.in_flight.contains_live(&sensor_fp).await {
            debug!(fingerprint = %sensor_fp, "identical reading already in flight, suppressing");
            return Ok(DispatchOutcome::DuplicateSuppressed);
        }
        self.in_flight.insert(sensor_fp.clone()).await;

        let mut empty_replies: u32 = 0;
        let mut rate_limit_hits: u32 = 0;

        loop {
            match self.workflow.run_workflow(&sensor).await {
                Ok(reply) => match reply.control {
                    Some(control) => {
                        return self.commit(sensor, control, &sensor_fp).await;
                    }
                    None => {
                        empty_replies += 1;
                        if empty_replies > self.config.max_empty_retries {
                            self.in_flight.remove(&sensor_fp).await;
                            return Err(DomainError::EmptyOutputExhausted {
                                attempts: empty_replies,
                            });
                        }
                        let delay = self.backoff(empty_replies);
                        debug!(
                            attempt = empty_replies,
                            delay_secs = delay.as_secs(),
                            "workflow returned no control output, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                },
                Err(WorkflowCallError::Http { status: 429 }) => {
                    rate_limit_hits += 1;
                    if rate_limit_hits > self.config.rate_limit_max_retries {
                        self.in_flight.remove(&sensor_fp).await;
                        return Err(DomainError::RateLimited {
                            attempts: rate_limit_hits,
                        });
                    }
                    let delay = self.backoff(rate_limit_hits);
                    debug!(
                        attempt = rate_limit_hits,
                        delay_secs = delay.as_secs(),
                        "workflow rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(WorkflowCallError::Http { status }) => {
                    self.in_flight.remove(&sensor_fp).await;
                    return Err(DomainError::WorkflowHttp { status });
                }
                Err(WorkflowCallError::Timeout) => {
                    // Timeouts are "maybe succeeded": hold the marker so an
                    // identical reading cannot retrigger until TTL expiry.
                    // Connection and HTTP errors are "definitely failed" and
                    // release the marker immediately.
                    warn!(fingerprint = %sensor_fp, "workflow call timed out, holding in-flight marker");
                    return Ok(DispatchOutcome::TimedOutHeld);
                }
                Err(WorkflowCallError::Connection(message)) => {
                    self.in_flight.remove(&sensor_fp).await;
                    return Err(DomainError::WorkflowConnection(truncate_error_text(
                        &message,
                        ERROR_TEXT_MAX_CHARS,
                    )));
                }
            }
        }
    }

    async fn commit(
        &self,
        sensor: FieldMap,
        control: FieldMap,
        sensor_fp: &str,
    ) -> DomainResult<DispatchOutcome> {
        let pair_fp = fingerprint(&sensor, Some(&control))?;
        let entry = LogEntry::new(sensor, control, LogSource::Workflow);

        // Persistence failures are recovered: the entry stays in memory and
        // the next append rewrites the file. Dedup state is updated either way.
        if let Err(e) = self.store.append(entry).await {
            warn!(error = %e, "control log write failed, entry retained in memory");
        }

        self.recent_success.insert(pair_fp).await;
        self.in_flight.remove(sensor_fp).await;

        info!(fingerprint = %sensor_fp, "workflow decision committed");
        Ok(DispatchOutcome::Logged)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let secs = 2u64
            .saturating_pow(attempt)
            .min(self.config.backoff_cap_secs);
        Duration::from_secs(secs)
    }
}
