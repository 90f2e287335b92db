use std::mem;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use skylog_domain::{
    AddOutcome, CommitResult, FlushTrigger, IngestError, IngestResult, TelemetryRecord,
};

/// Batch accumulation limits
#[derive(Debug, Clone)]
pub struct BatchBufferConfig {
    /// Flush trigger by record count
    pub max_batch_size: usize,
    /// Flush trigger by age of the oldest buffered record
    pub max_batch_age: Duration,
    /// Bound on batches waiting for the flush worker before producers are
    /// pushed back with BufferBusy
    pub flush_queue_depth: usize,
}

impl Default for BatchBufferConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            max_batch_age: Duration::from_secs(30),
            flush_queue_depth: 4,
        }
    }
}

/// A batch on its way to the commit engine
pub struct FlushRequest {
    pub records: Vec<TelemetryRecord>,
    pub trigger: FlushTrigger,
    pub reply: Option<oneshot::Sender<IngestResult<CommitResult>>>,
}

struct BufferState {
    records: Vec<TelemetryRecord>,
    oldest_since: Option<Instant>,
    closed: bool,
}

/// Accumulates validated records and decides when to flush.
///
/// Producers contend on one short mutex; the hand-off to the flush worker
/// swaps in a fresh batch under that same lock, so commit latency never
/// blocks ingestion. A full batch that cannot be queued (commit pipeline
/// saturated) stays in place and further appends see BufferBusy until the
/// worker catches up.
pub struct BatchBuffer {
    config: BatchBufferConfig,
    state: Mutex<BufferState>,
    flush_tx: mpsc::Sender<FlushRequest>,
}

impl BatchBuffer {
    pub fn new(config: BatchBufferConfig, flush_tx: mpsc::Sender<FlushRequest>) -> Self {
        let capacity = config.max_batch_size;
        Self {
            config,
            state: Mutex::new(BufferState {
                records: Vec::with_capacity(capacity),
                oldest_since: None,
                closed: false,
            }),
            flush_tx,
        }
    }

    /// Append one record. Reaching the configured maximum hands the batch
    /// to the flush worker before any record of the next batch is buffered.
    pub fn add(&self, record: TelemetryRecord) -> IngestResult<AddOutcome> {
        let max = self.config.max_batch_size;
        let mut state = self.state.lock();

        // Once the shutdown drain has taken the buffer, an accepted record
        // would have no path to a commit or the dead letter
        if state.closed {
            return Err(IngestError::Shutdown);
        }

        // A full batch left behind by a saturated queue must go out before
        // anything new is accepted
        if state.records.len() >= max {
            self.hand_off(&mut state, FlushTrigger::Size, None)?;
        }

        state.records.push(record);
        if state.oldest_since.is_none() {
            state.oldest_since = Some(Instant::now());
        }
        let current_size = state.records.len();
        let is_full = current_size >= max;

        if is_full {
            // Exactly one size-triggered flush per full batch; on a
            // saturated queue the batch stays and the *next* add retries
            if let Err(e) = self.hand_off(&mut state, FlushTrigger::Size, None) {
                debug!("flush queue saturated, keeping full batch buffered: {e}");
            }
        }

        Ok(AddOutcome {
            current_size,
            is_full,
        })
    }

    /// Force an out-of-band flush of whatever is buffered and wait for the
    /// commit outcome. An empty buffer completes immediately.
    pub async fn flush_now(&self) -> IngestResult<CommitResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(IngestError::Shutdown);
            }
            if state.records.is_empty() {
                return Ok(CommitResult::default());
            }
            self.hand_off(&mut state, FlushTrigger::Manual, Some(reply_tx))?;
        }

        reply_rx.await.map_err(|_| IngestError::Shutdown)?
    }

    /// Hand off the batch if the oldest buffered record has exceeded the
    /// configured age. Invoked by the periodic age trigger so low-traffic
    /// periods cannot stall commits indefinitely.
    pub fn flush_aged(&self) -> IngestResult<bool> {
        let mut state = self.state.lock();
        let aged = matches!(
            state.oldest_since,
            Some(since) if since.elapsed() >= self.config.max_batch_age
        );
        if !aged || state.records.is_empty() {
            return Ok(false);
        }
        self.hand_off(&mut state, FlushTrigger::Age, None)?;
        Ok(true)
    }

    /// Take everything currently buffered, bypassing the queue, and close
    /// the buffer to further appends. Used by the flush worker's shutdown
    /// drain; afterwards `add` and `flush_now` report `Shutdown`.
    pub fn take_all(&self) -> Vec<TelemetryRecord> {
        let mut state = self.state.lock();
        state.closed = true;
        state.oldest_since = None;
        mem::take(&mut state.records)
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.max_batch_size
    }

    /// Swap out the current batch and queue it, restoring it untouched if
    /// the flush queue has no room. Must be called with the state lock held;
    /// never awaits.
    fn hand_off(
        &self,
        state: &mut BufferState,
        trigger: FlushTrigger,
        reply: Option<oneshot::Sender<IngestResult<CommitResult>>>,
    ) -> IngestResult<()> {
        let records = mem::take(&mut state.records);
        let oldest_since = state.oldest_since.take();

        let request = FlushRequest {
            records,
            trigger,
            reply,
        };
        match self.flush_tx.try_send(request) {
            Ok(()) => {
                debug!(?trigger, "batch handed to flush worker");
                Ok(())
            }
            Err(TrySendError::Full(request)) => {
                state.records = request.records;
                state.oldest_since = oldest_since;
                Err(IngestError::BufferBusy)
            }
            Err(TrySendError::Closed(request)) => {
                state.records = request.records;
                state.oldest_since = oldest_since;
                Err(IngestError::Shutdown)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn record() -> TelemetryRecord {
        TelemetryRecord::from_fields(&Map::new()).unwrap()
    }

    fn buffer_with(
        max_batch_size: usize,
        queue_depth: usize,
    ) -> (BatchBuffer, mpsc::Receiver<FlushRequest>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let buffer = BatchBuffer::new(
            BatchBufferConfig {
                max_batch_size,
                max_batch_age: Duration::from_secs(30),
                flush_queue_depth: queue_depth,
            },
            tx,
        );
        (buffer, rx)
    }

    #[tokio::test]
    async fn test_add_counts_accepted_records() {
        let (buffer, _rx) = buffer_with(5, 1);

        for expected in 1..=4 {
            let outcome = buffer.add(record()).unwrap();
            assert_eq!(outcome.current_size, expected);
            assert!(!outcome.is_full);
        }
        assert_eq!(buffer.len(), 4);
    }

    #[tokio::test]
    async fn test_full_batch_hands_off_exactly_once() {
        let (buffer, mut rx) = buffer_with(3, 2);

        for _ in 0..2 {
            buffer.add(record()).unwrap();
        }
        let outcome = buffer.add(record()).unwrap();
        assert!(outcome.is_full);
        assert_eq!(outcome.current_size, 3);

        // The full batch went out, the buffer starts fresh
        assert_eq!(buffer.len(), 0);
        let request = rx.try_recv().unwrap();
        assert_eq!(request.records.len(), 3);
        assert!(matches!(request.trigger, FlushTrigger::Size));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_next_record_lands_in_fresh_batch() {
        let (buffer, mut rx) = buffer_with(3, 2);

        for _ in 0..4 {
            buffer.add(record()).unwrap();
        }
        assert_eq!(buffer.len(), 1);
        assert_eq!(rx.try_recv().unwrap().records.len(), 3);
    }

    #[tokio::test]
    async fn test_saturated_queue_reports_buffer_busy() {
        let (buffer, mut rx) = buffer_with(2, 1);

        // First full batch occupies the queue slot
        buffer.add(record()).unwrap();
        buffer.add(record()).unwrap();
        // Second full batch cannot be handed off; records are kept
        buffer.add(record()).unwrap();
        buffer.add(record()).unwrap();
        assert_eq!(buffer.len(), 2);

        // Buffer holds a full batch and the queue is still occupied
        let err = buffer.add(record()).unwrap_err();
        assert!(matches!(err, IngestError::BufferBusy));
        assert_eq!(buffer.len(), 2);

        // Once the worker drains the queue, the stuck batch goes out first
        let first = rx.try_recv().unwrap();
        assert_eq!(first.records.len(), 2);
        let outcome = buffer.add(record()).unwrap();
        assert_eq!(outcome.current_size, 1);
        assert_eq!(rx.try_recv().unwrap().records.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_aged_only_past_threshold() {
        let (tx, mut rx) = mpsc::channel(2);
        let buffer = BatchBuffer::new(
            BatchBufferConfig {
                max_batch_size: 10,
                max_batch_age: Duration::from_millis(0),
                flush_queue_depth: 2,
            },
            tx,
        );

        assert!(!buffer.flush_aged().unwrap());
        buffer.add(record()).unwrap();
        assert!(buffer.flush_aged().unwrap());

        let request = rx.try_recv().unwrap();
        assert_eq!(request.records.len(), 1);
        assert!(matches!(request.trigger, FlushTrigger::Age));
    }

    #[tokio::test]
    async fn test_flush_now_empty_completes_immediately() {
        let (buffer, _rx) = buffer_with(10, 1);
        let result = buffer.flush_now().await.unwrap();
        assert_eq!(result.committed, 0);
        assert_eq!(result.attempts, 0);
    }

    #[tokio::test]
    async fn test_add_after_shutdown_drain_reports_shutdown() {
        let (buffer, _rx) = buffer_with(5, 1);
        buffer.add(record()).unwrap();

        let drained = buffer.take_all();
        assert_eq!(drained.len(), 1);

        // The drain closed the buffer; nothing may be accepted afterwards
        assert!(matches!(buffer.add(record()), Err(IngestError::Shutdown)));
        assert!(matches!(buffer.flush_now().await, Err(IngestError::Shutdown)));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_no_records_lost_across_handoff() {
        let (buffer, mut rx) = buffer_with(3, 4);

        let total = 10;
        for _ in 0..total {
            buffer.add(record()).unwrap();
        }

        let mut flushed = 0;
        while let Ok(request) = rx.try_recv() {
            flushed += request.records.len();
        }
        assert_eq!(flushed + buffer.len(), total);
    }
}
