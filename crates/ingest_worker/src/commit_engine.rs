use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use skylog_domain::error::record_label;
use skylog_domain::{
    CommitFailure, CommitResult, PartitionProvisioner, RejectedRecord, StoreError, TelemetryRecord,
    TelemetryStore,
};

use crate::stats::IngestStats;

/// Backoff schedule for transient commit failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay before retry number `attempt` (0-based), capped
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Capped exponential backoff plus uniform jitter of up to one base
    /// delay, to keep concurrent retries from synchronizing
    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=self.base_delay);
        (self.base_backoff(attempt) + jitter).min(self.max_delay)
    }
}

/// Performs durable bulk writes with retry, backoff and poison-record
/// isolation, and keeps the process-wide counters in step with every
/// commit it makes.
pub struct CommitEngine {
    store: Arc<dyn TelemetryStore>,
    provisioner: Option<Arc<dyn PartitionProvisioner>>,
    policy: RetryPolicy,
    stats: Arc<IngestStats>,
}

impl CommitEngine {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        provisioner: Option<Arc<dyn PartitionProvisioner>>,
        policy: RetryPolicy,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            store,
            provisioner,
            policy,
            stats,
        }
    }

    /// Commit a batch in one bulk write per attempt.
    ///
    /// On exhausted retries the full, unmodified batch comes back in the
    /// failure — the engine never drops data on its own.
    pub async fn commit(
        &self,
        batch: Vec<TelemetryRecord>,
    ) -> Result<CommitResult, CommitFailure> {
        if batch.is_empty() {
            return Ok(CommitResult::default());
        }

        let mut attempts = 0u32;
        let mut provisioned = false;

        loop {
            attempts += 1;
            match self.store.insert_batch(&batch).await {
                Ok(()) => {
                    self.stats.add_committed(batch.len());
                    info!(records = batch.len(), attempts, "batch committed");
                    return Ok(CommitResult {
                        committed: batch.len(),
                        rejected: Vec::new(),
                        attempts,
                    });
                }
                Err(e) if e.is_retryable() && attempts < self.policy.max_attempts => {
                    let delay = self.policy.backoff_with_jitter(attempts - 1);
                    self.stats.add_retries(1);
                    warn!(
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient commit failure, backing off: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(StoreError::PartitionGap(msg))
                    if self.provisioner.is_some() && !provisioned =>
                {
                    // Trade one synchronous DDL round trip for correctness:
                    // create the missing partition(s), then retry the batch
                    provisioned = true;
                    warn!("partition gap on commit, provisioning synchronously: {msg}");
                    let timestamps: Vec<_> = batch.iter().map(|r| r.created_at).collect();
                    if let Some(provisioner) = &self.provisioner {
                        if let Err(e) = provisioner.ensure_covering(&timestamps).await {
                            error!("synchronous partition provisioning failed: {e}");
                            return self.salvage(batch, attempts).await;
                        }
                    }
                }
                Err(StoreError::Rejected(_)) | Err(StoreError::PartitionGap(_)) => {
                    // Content problem inside the batch: isolate it so one
                    // bad record cannot fail its siblings
                    return self.salvage(batch, attempts).await;
                }
                Err(e) => {
                    self.stats.add_failed(batch.len());
                    error!(
                        records = batch.len(),
                        attempts, "commit failed terminally: {e}"
                    );
                    return Err(CommitFailure {
                        records: batch,
                        attempts,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Per-record fallback after a rejected bulk attempt: every record
    /// either commits or is reported individually with its cause.
    async fn salvage(
        &self,
        batch: Vec<TelemetryRecord>,
        bulk_attempts: u32,
    ) -> Result<CommitResult, CommitFailure> {
        warn!(
            records = batch.len(),
            "bulk attempt rejected, isolating records individually"
        );

        let mut committed = 0usize;
        let mut rejected = Vec::new();

        for record in batch {
            match self.insert_single(&record).await {
                Ok(()) => committed += 1,
                Err(e) => {
                    warn!(
                        record = %record_label(record.created_at, record.drone_id.as_deref()),
                        "record rejected: {e}"
                    );
                    rejected.push(RejectedRecord {
                        record,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.stats.add_committed(committed);
        self.stats.add_failed(rejected.len());
        info!(
            committed,
            rejected = rejected.len(),
            "salvage pass finished"
        );
        Ok(CommitResult {
            committed,
            rejected,
            attempts: bulk_attempts,
        })
    }

    /// One record with its own transient-retry budget and a single
    /// provisioning attempt for partition gaps
    async fn insert_single(&self, record: &TelemetryRecord) -> Result<(), StoreError> {
        let mut attempts = 0u32;
        let mut provisioned = false;
        loop {
            attempts += 1;
            match self.store.insert_one(record).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempts < self.policy.max_attempts => {
                    self.stats.add_retries(1);
                    tokio::time::sleep(self.policy.backoff_with_jitter(attempts - 1)).await;
                }
                Err(StoreError::PartitionGap(msg)) => {
                    match (&self.provisioner, provisioned) {
                        (Some(provisioner), false) => {
                            provisioned = true;
                            provisioner.ensure_covering(&[record.created_at]).await?;
                        }
                        _ => return Err(StoreError::PartitionGap(msg)),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use skylog_domain::{MockPartitionProvisioner, MockTelemetryStore};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn records(count: usize) -> Vec<TelemetryRecord> {
        (0..count)
            .map(|_| TelemetryRecord::from_fields(&Map::new()).unwrap())
            .collect()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn engine(store: MockTelemetryStore) -> CommitEngine {
        CommitEngine::new(
            Arc::new(store),
            None,
            fast_policy(),
            Arc::new(IngestStats::new()),
        )
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.base_backoff(0), Duration::from_millis(500));
        assert_eq!(policy.base_backoff(1), Duration::from_secs(1));
        assert_eq!(policy.base_backoff(2), Duration::from_secs(2));
        // Capped from here on
        assert_eq!(policy.base_backoff(3), Duration::from_secs(2));
        assert_eq!(policy.base_backoff(10), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_commit_succeeds_first_attempt() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_insert_batch()
            .times(1)
            .returning(|_| Ok(()));

        let result = engine(store).commit(records(5)).await.unwrap();
        assert_eq!(result.committed, 5);
        assert_eq!(result.attempts, 1);
        assert!(result.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_retried_within_cap() {
        // Fails twice, then succeeds
        let calls = Arc::new(AtomicU32::new(0));
        let mut store = MockTelemetryStore::new();
        let call_counter = calls.clone();
        store.expect_insert_batch().times(3).returning(move |_| {
            if call_counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Transient("connection reset".to_string()))
            } else {
                Ok(())
            }
        });

        let stats = Arc::new(IngestStats::new());
        let engine = CommitEngine::new(Arc::new(store), None, fast_policy(), stats.clone());

        let result = engine.commit(records(10)).await.unwrap();
        assert_eq!(result.committed, 10);
        assert_eq!(result.attempts, 3);
        assert_eq!(stats.records_committed(), 10);
    }

    #[tokio::test]
    async fn test_exhausted_retries_returns_full_batch() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_insert_batch()
            .times(3)
            .returning(|_| Err(StoreError::Transient("timeout".to_string())));

        let stats = Arc::new(IngestStats::new());
        let engine = CommitEngine::new(Arc::new(store), None, fast_policy(), stats.clone());

        let batch = records(7);
        let failure = engine.commit(batch).await.unwrap_err();
        // Nothing vanishes: the whole batch comes back
        assert_eq!(failure.records.len(), 7);
        assert_eq!(failure.attempts, 3);
        assert_eq!(stats.records_failed(), 7);
    }

    #[tokio::test]
    async fn test_poison_record_isolated_from_siblings() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_insert_batch()
            .times(1)
            .returning(|_| Err(StoreError::Rejected("duplicate key".to_string())));
        // 500 individual inserts: one keeps failing, the rest commit
        let calls = Arc::new(AtomicU32::new(0));
        let call_counter = calls.clone();
        store.expect_insert_one().times(500).returning(move |_| {
            if call_counter.fetch_add(1, Ordering::SeqCst) == 123 {
                Err(StoreError::Rejected("duplicate key".to_string()))
            } else {
                Ok(())
            }
        });

        let stats = Arc::new(IngestStats::new());
        let engine = CommitEngine::new(Arc::new(store), None, fast_policy(), stats.clone());

        let result = engine.commit(records(500)).await.unwrap();
        assert_eq!(result.committed, 499);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].reason, "Record rejected by storage: duplicate key");
        assert_eq!(stats.records_committed(), 499);
        assert_eq!(stats.records_failed(), 1);
    }

    #[tokio::test]
    async fn test_partition_gap_provisions_then_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut store = MockTelemetryStore::new();
        let call_counter = calls.clone();
        store.expect_insert_batch().times(2).returning(move |_| {
            if call_counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::PartitionGap(
                    "no partition of relation \"telemetry\" found for row".to_string(),
                ))
            } else {
                Ok(())
            }
        });

        let mut provisioner = MockPartitionProvisioner::new();
        provisioner
            .expect_ensure_covering()
            .times(1)
            .returning(|_| Ok(()));

        let engine = CommitEngine::new(
            Arc::new(store),
            Some(Arc::new(provisioner)),
            fast_policy(),
            Arc::new(IngestStats::new()),
        );

        let result = engine.commit(records(3)).await.unwrap();
        assert_eq!(result.committed, 3);
    }

    #[tokio::test]
    async fn test_partition_gap_without_provisioner_rejects_explicitly() {
        let mut store = MockTelemetryStore::new();
        store.expect_insert_batch().times(1).returning(|_| {
            Err(StoreError::PartitionGap("no partition found".to_string()))
        });
        store
            .expect_insert_one()
            .times(2)
            .returning(|_| Err(StoreError::PartitionGap("no partition found".to_string())));

        let result = engine(store).commit(records(2)).await.unwrap();
        // Never silently dropped: every record is reported with a cause
        assert_eq!(result.committed, 0);
        assert_eq!(result.rejected.len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_fails_without_retry() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_insert_batch()
            .times(1)
            .returning(|_| Err(StoreError::Fatal("relation missing".to_string())));

        let failure = engine(store).commit(records(4)).await.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.records.len(), 4);
    }
}
