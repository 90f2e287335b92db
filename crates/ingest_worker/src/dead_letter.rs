use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::error;

use skylog_domain::{CommitFailure, DeadLetterSink};

/// Default dead-letter sink: logs the terminal failure and keeps the last
/// failed batch in memory for inspection. Deployments with stricter
/// durability needs inject their own sink.
#[derive(Default)]
pub struct LoggingDeadLetter {
    last_failure: Mutex<Option<CommitFailure>>,
}

impl LoggingDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the most recent terminal failure, if any
    pub fn last_failure_size(&self) -> Option<usize> {
        self.last_failure.lock().as_ref().map(|f| f.records.len())
    }
}

#[async_trait]
impl DeadLetterSink for LoggingDeadLetter {
    async fn receive(&self, failure: CommitFailure) {
        error!(
            records = failure.records.len(),
            attempts = failure.attempts,
            reason = %failure.reason,
            "batch commit failed terminally, records handed to dead letter"
        );
        *self.last_failure.lock() = Some(failure);
    }
}
