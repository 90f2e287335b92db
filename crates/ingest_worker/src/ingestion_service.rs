use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use skylog_domain::{
    AddOutcome, CommitResult, HealthSnapshot, IngestResult, TelemetryRecord,
};

use crate::batch_buffer::BatchBuffer;
use crate::stats::IngestStats;

/// In-process API handed to the request layer.
///
/// `submit` validates and buffers; `force_flush` is the manual flush entry
/// point; `status` is the cheap point-in-time snapshot for health probes.
#[derive(Clone)]
pub struct IngestionService {
    buffer: Arc<BatchBuffer>,
    stats: Arc<IngestStats>,
}

impl IngestionService {
    pub fn new(buffer: Arc<BatchBuffer>, stats: Arc<IngestStats>) -> Self {
        Self { buffer, stats }
    }

    /// Validate already-parsed fields and append the record to the current
    /// batch. Rejections never enter the buffer.
    pub fn submit(&self, fields: &Map<String, Value>) -> IngestResult<AddOutcome> {
        let record = TelemetryRecord::from_fields(fields)?;
        self.submit_record(record)
    }

    /// Append an already-validated record
    pub fn submit_record(&self, record: TelemetryRecord) -> IngestResult<AddOutcome> {
        let outcome = self.buffer.add(record)?;
        debug!(
            current_size = outcome.current_size,
            is_full = outcome.is_full,
            "record buffered"
        );
        Ok(outcome)
    }

    /// Force an out-of-band flush and wait for its commit outcome
    pub async fn force_flush(&self) -> IngestResult<CommitResult> {
        self.buffer.flush_now().await
    }

    /// Point-in-time ingestion status; no storage round trip
    pub fn status(&self) -> HealthSnapshot {
        self.stats
            .snapshot(self.buffer.len(), self.buffer.capacity())
    }
}
