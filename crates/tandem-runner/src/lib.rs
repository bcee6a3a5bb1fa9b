//! Concurrent application runner with graceful shutdown.
//!
//! Named processes run until one fails or a SIGTERM/SIGINT arrives; all are
//! then cancelled through a shared token and the registered closers run
//! under a timeout, regardless of how the processes stopped.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type ProcessFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Process = Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>;
type Closer = Box<dyn FnOnce() -> ProcessFuture + Send>;

pub struct Runner {
    processes: Vec<(String, Process)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Add a long-running process. The name appears in logs; the token tells
    /// the process to stop.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Add a cleanup function, run after every process has stopped.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// External handle for stopping the runner, mainly for tests.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until every process has stopped, then run the closers. Returns
    /// the first process error, if any.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "process completed");
                }
                Ok((name, Err(e))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, error = %format!("{:#}", e), "process failed");
                        first_error = Some(e);
                        token.cancel();
                    }
                }
                Err(e) => {
                    error!(error = %e, "process panicked");
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            info!(timeout_secs = self.closer_timeout.as_secs(), "running closers");
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                error!("closers timed out");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(e) => error!(error = %e, "failed to install signal handler"),
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("received SIGTERM");
                    token.cancel();
                }
                Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
            }
        });
    }
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(e)) => error!(error = %format!("{:#}", e), "closer failed"),
            Err(e) => error!(error = %e, "closer panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cancellation_stops_processes_and_runs_closers() {
        let closer_ran = Arc::new(AtomicBool::new(false));
        let closer_flag = Arc::clone(&closer_ran);

        let token = CancellationToken::new();
        let stop = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.cancel();
        });

        let result = Runner::new()
            .with_named_process("worker", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_closer(move || async move {
                closer_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_cancellation_token(token)
            .run()
            .await;

        assert!(result.is_ok());
        assert!(closer_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_process_cancels_the_rest() {
        let result = Runner::new()
            .with_named_process("failing", |_ctx| async move {
                Err(anyhow::anyhow!("boom"))
            })
            .with_named_process("waiting", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .run()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_closer_failure_does_not_mask_success() {
        let result = Runner::new()
            .with_named_process("worker", |_ctx| async move { Ok(()) })
            .with_closer(|| async move { Err(anyhow::anyhow!("cleanup failed")) })
            .run()
            .await;

        assert!(result.is_ok());
    }
}
