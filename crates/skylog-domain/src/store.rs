use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::partition::PartitionSpec;
use crate::record::TelemetryRecord;
use crate::rollup::RollupWindow;
use crate::types::CommitFailure;

/// Durable sink for telemetry records.
/// Infrastructure layer (skylog-postgres) implements this trait.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// One bulk durable write attempt for the whole batch
    async fn insert_batch(&self, records: &[TelemetryRecord]) -> StoreResult<()>;

    /// Single-record write, used to isolate poison records out of a
    /// rejected bulk attempt
    async fn insert_one(&self, record: &TelemetryRecord) -> StoreResult<()>;

    /// Cheap connectivity probe
    async fn ping(&self) -> StoreResult<()>;
}

/// Low-level partition lifecycle operations against durable storage
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Partitions currently attached to the telemetry table
    async fn existing_partitions(&self) -> StoreResult<Vec<PartitionSpec>>;

    /// Create one partition and its index set; must be idempotent
    async fn create_partition(&self, spec: &PartitionSpec) -> StoreResult<()>;

    /// Drop one partition together with its indexes
    async fn drop_partition(&self, name: &str) -> StoreResult<()>;
}

/// Synchronous partition creation on behalf of the commit engine, for
/// records whose timestamps land outside every provisioned partition
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait PartitionProvisioner: Send + Sync {
    /// Ensure a partition exists for every month touched by `timestamps`
    async fn ensure_covering(&self, timestamps: &[DateTime<Utc>]) -> StoreResult<()>;
}

/// Refresh access to the derived rollups
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait RollupStore: Send + Sync {
    /// Recompute one window without blocking concurrent readers of the
    /// previous rollup version
    async fn refresh(&self, window: RollupWindow) -> StoreResult<()>;
}

/// Where terminally failed batches go. The engine never drops data
/// silently; callers decide between requeue, persistence and alerting.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn receive(&self, failure: CommitFailure);
}
