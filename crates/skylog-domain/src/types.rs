use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::TelemetryRecord;

/// Result of appending one record to the batch buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub current_size: usize,
    pub is_full: bool,
}

/// What caused a batch to be handed to the commit engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushTrigger {
    Size,
    Age,
    Manual,
    Shutdown,
}

/// A record the commit engine isolated out of an otherwise good batch
#[derive(Debug, Clone)]
pub struct RejectedRecord {
    pub record: TelemetryRecord,
    pub reason: String,
}

/// Outcome of a completed flush
#[derive(Debug, Clone, Default)]
pub struct CommitResult {
    pub committed: usize,
    pub rejected: Vec<RejectedRecord>,
    pub attempts: u32,
}

/// Terminal failure of a flush: retries exhausted, the full batch comes
/// back to the caller untouched
#[derive(Debug)]
pub struct CommitFailure {
    pub records: Vec<TelemetryRecord>,
    pub attempts: u32,
    pub reason: String,
}

/// Compact record of the most recent flush, kept for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushSummary {
    pub trigger: FlushTrigger,
    pub committed: usize,
    pub rejected: usize,
    pub attempts: u32,
    pub failed: bool,
    pub finished_at: DateTime<Utc>,
}

/// Point-in-time ingestion status for the monitoring surface.
///
/// Built from counters and one short lock; no storage round trip happens
/// on the snapshot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub buffered_records: usize,
    pub batch_capacity: usize,
    pub is_full: bool,
    pub last_flush: Option<FlushSummary>,
    pub storage_healthy: bool,
    pub records_committed: u64,
    pub records_failed: u64,
    pub retry_count: u64,
    pub flush_count: u64,
}
