use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use skylog_domain::{DeadLetterSink, FlushSummary, FlushTrigger, IngestError};

use crate::batch_buffer::{BatchBuffer, FlushRequest};
use crate::commit_engine::CommitEngine;
use crate::stats::IngestStats;

/// Dedicated commit task: consumes batches from the flush queue so storage
/// round trips never run under the producer-facing lock.
pub struct FlushWorker {
    rx: mpsc::Receiver<FlushRequest>,
    buffer: Arc<BatchBuffer>,
    engine: CommitEngine,
    stats: Arc<IngestStats>,
    dead_letter: Arc<dyn DeadLetterSink>,
}

impl FlushWorker {
    pub fn new(
        rx: mpsc::Receiver<FlushRequest>,
        buffer: Arc<BatchBuffer>,
        engine: CommitEngine,
        stats: Arc<IngestStats>,
        dead_letter: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            rx,
            buffer,
            engine,
            stats,
            dead_letter,
        }
    }

    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!("flush worker started");
        loop {
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = ctx.cancelled() => {
                    self.drain().await;
                    break;
                }
            }
        }
        info!("flush worker stopped");
        Ok(())
    }

    async fn handle(&self, request: FlushRequest) {
        let trigger = request.trigger;
        let outcome = self.engine.commit(request.records).await;

        let reply = match outcome {
            Ok(result) => {
                self.stats.record_flush(FlushSummary {
                    trigger,
                    committed: result.committed,
                    rejected: result.rejected.len(),
                    attempts: result.attempts,
                    failed: false,
                    finished_at: Utc::now(),
                });
                Ok(result)
            }
            Err(failure) => {
                self.stats.record_flush(FlushSummary {
                    trigger,
                    committed: 0,
                    rejected: 0,
                    attempts: failure.attempts,
                    failed: true,
                    finished_at: Utc::now(),
                });
                let error = IngestError::CommitFatal {
                    attempts: failure.attempts,
                    reason: failure.reason.clone(),
                };
                // Caller-facing policy decision happens at the sink
                self.dead_letter.receive(failure).await;
                Err(error)
            }
        };

        if let Some(reply_tx) = request.reply {
            // A caller that stopped waiting is fine; the commit already
            // happened and is accounted for
            let _ = reply_tx.send(reply);
        }
    }

    /// Shutdown path: finish queued batches, then commit whatever is still
    /// buffered. Uncommitted records are surfaced through the dead-letter
    /// sink, never silently discarded.
    async fn drain(&mut self) {
        info!("flush worker draining on shutdown");
        self.rx.close();
        while let Some(request) = self.rx.recv().await {
            self.handle(request).await;
        }

        let leftover = self.buffer.take_all();
        if !leftover.is_empty() {
            warn!(
                records = leftover.len(),
                "committing buffered records on shutdown"
            );
            self.handle(FlushRequest {
                records: leftover,
                trigger: FlushTrigger::Shutdown,
                reply: None,
            })
            .await;
        }
    }
}

/// Periodic age check: hands the batch off when the oldest buffered record
/// exceeds the configured age, so low-traffic periods cannot stall commits.
pub async fn run_age_trigger(
    buffer: Arc<BatchBuffer>,
    period: Duration,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,
            _ = tick.tick() => {
                match buffer.flush_aged() {
                    Ok(true) => info!("age threshold reached, batch flushed"),
                    Ok(false) => {}
                    // Saturated queue or shutdown; the next tick retries
                    Err(e) => warn!("age-triggered flush postponed: {e}"),
                }
            }
        }
    }
    Ok(())
}
