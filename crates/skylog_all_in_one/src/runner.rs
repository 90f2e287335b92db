use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A long-running process driven by the runner. Takes the shared
/// cancellation token and runs until cancelled or failed.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

/// Cleanup function executed after every process has stopped
pub type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

/// Orchestrates the service's long-running processes with graceful shutdown.
///
/// Processes run concurrently until one fails or a shutdown signal arrives;
/// either way every process is cancelled through the shared token, the
/// runner waits for them to drain, then executes the closers under a
/// timeout. Exit code reflects whether any process failed.
pub struct Runner {
    processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    token: CancellationToken,
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
            token: CancellationToken::new(),
        }
    }

    pub fn with_named_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.processes.push((name.into(), process));
        self
    }

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

    /// External control over shutdown, mainly for tests
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Runs until completion or shutdown. Returns `true` when every process
    /// finished without error.
    pub async fn run(self) -> bool {
        let token = self.token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut failed = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "process finished");
                }
                Ok((name, Err(e))) => {
                    error!(process = %name, "process failed: {e:#}");
                    failed = true;
                }
                Err(e) => {
                    error!("process panicked: {e}");
                    failed = true;
                }
            }
            // One stopping process stops them all; the remainder drain
            // through their cancellation paths
            token.cancel();
        }

        if !self.closers.is_empty() {
            info!(timeout = ?self.closer_timeout, "running closers");
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                error!("closers timed out");
                failed = true;
            }
        }

        !failed
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    tokio::spawn({
        let token = token.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received interrupt, shutting down");
                    token.cancel();
                }
                Err(e) => error!("failed to listen for interrupt: {e}"),
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM, shutting down");
                token.cancel();
            }
            Err(e) => error!("failed to listen for SIGTERM: {e}"),
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }
    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer finished"),
            Ok(Err(e)) => error!("closer failed: {e:#}"),
            Err(e) => error!("closer panicked: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn blocking_process() -> AppProcess {
        Box::new(|ctx: CancellationToken| {
            Box::pin(async move {
                ctx.cancelled().await;
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_cancellation_stops_processes_and_runs_closers() {
        let closed = Arc::new(AtomicBool::new(false));
        let closed_flag = closed.clone();

        let token = CancellationToken::new();
        let runner = Runner::new()
            .with_named_process("blocker", blocking_process())
            .with_closer(move || async move {
                closed_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_cancellation_token(token.clone())
            .with_closer_timeout(Duration::from_secs(1));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        assert!(runner.run().await);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_process_cancels_the_rest() {
        let failing: AppProcess = Box::new(|_ctx| {
            Box::pin(async move { Err(anyhow::anyhow!("storage unreachable")) })
        });

        let runner = Runner::new()
            .with_named_process("failing", failing)
            .with_named_process("blocker", blocking_process());

        assert!(!runner.run().await);
    }
}
