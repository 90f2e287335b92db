pub mod error;
pub mod partition;
pub mod record;
pub mod rollup;
pub mod store;
pub mod types;

pub use error::{IngestError, IngestResult, StoreError, StoreResult};
pub use partition::{
    expired_partitions, missing_partitions, partition_for, partitions_covering, PartitionSpec,
    DEFAULT_HORIZON_MONTHS, DEFAULT_RETENTION_MONTHS,
};
pub use record::TelemetryRecord;
pub use rollup::RollupWindow;
pub use store::{DeadLetterSink, PartitionProvisioner, PartitionStore, RollupStore, TelemetryStore};
pub use types::{
    AddOutcome, CommitFailure, CommitResult, FlushSummary, FlushTrigger, HealthSnapshot,
    RejectedRecord,
};

#[cfg(any(test, feature = "mocks"))]
pub use store::{
    MockDeadLetterSink, MockPartitionProvisioner, MockPartitionStore, MockRollupStore,
    MockTelemetryStore,
};
