use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use skylog_domain::{FlushSummary, HealthSnapshot};

/// Process-wide ingestion counters.
///
/// Updated by the commit engine as an explicit post-commit step, so the
/// counters always describe exactly the committed set. Reads are atomics
/// plus one short lock; snapshotting is safe at health-probe frequency.
#[derive(Default)]
pub struct IngestStats {
    records_committed: AtomicU64,
    records_failed: AtomicU64,
    retry_count: AtomicU64,
    flush_count: AtomicU64,
    storage_healthy: AtomicBool,
    last_flush: Mutex<Option<FlushSummary>>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_committed(&self, count: usize) {
        self.records_committed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_failed(&self, count: usize) {
        self.records_failed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_retries(&self, count: u64) {
        self.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_flush(&self, summary: FlushSummary) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        *self.last_flush.lock() = Some(summary);
    }

    pub fn set_storage_healthy(&self, healthy: bool) {
        self.storage_healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn records_committed(&self) -> u64 {
        self.records_committed.load(Ordering::Relaxed)
    }

    pub fn records_failed(&self) -> u64 {
        self.records_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, buffered_records: usize, batch_capacity: usize) -> HealthSnapshot {
        HealthSnapshot {
            buffered_records,
            batch_capacity,
            is_full: buffered_records >= batch_capacity,
            last_flush: self.last_flush.lock().clone(),
            storage_healthy: self.storage_healthy.load(Ordering::Relaxed),
            records_committed: self.records_committed.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skylog_domain::FlushTrigger;

    #[test]
    fn test_counters_accumulate() {
        let stats = IngestStats::new();
        stats.add_committed(500);
        stats.add_committed(499);
        stats.add_failed(1);
        stats.add_retries(2);

        let snapshot = stats.snapshot(0, 500);
        assert_eq!(snapshot.records_committed, 999);
        assert_eq!(snapshot.records_failed, 1);
        assert_eq!(snapshot.retry_count, 2);
        assert!(!snapshot.is_full);
    }

    #[test]
    fn test_last_flush_is_replaced() {
        let stats = IngestStats::new();
        for committed in [10, 20] {
            stats.record_flush(FlushSummary {
                trigger: FlushTrigger::Size,
                committed,
                rejected: 0,
                attempts: 1,
                failed: false,
                finished_at: Utc::now(),
            });
        }

        let snapshot = stats.snapshot(3, 500);
        assert_eq!(snapshot.flush_count, 2);
        assert_eq!(snapshot.last_flush.unwrap().committed, 20);
        assert_eq!(snapshot.buffered_records, 3);
    }
}
