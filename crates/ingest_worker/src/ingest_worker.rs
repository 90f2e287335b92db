use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use skylog_domain::{
    DeadLetterSink, IngestError, IngestResult, PartitionProvisioner, PartitionStore, RollupStore,
    TelemetryStore,
};

use crate::batch_buffer::{BatchBuffer, BatchBufferConfig};
use crate::commit_engine::{CommitEngine, RetryPolicy};
use crate::flush_worker::{run_age_trigger, FlushWorker};
use crate::ingestion_service::IngestionService;
use crate::maintenance::{
    LayoutMaintenance, LayoutMaintenanceConfig, RollupMaintenance, StoragePing,
};
use crate::stats::IngestStats;

/// A long-running task handed to the runner
pub type WorkerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

#[derive(Debug, Clone)]
pub struct IngestWorkerConfig {
    pub buffer: BatchBufferConfig,
    pub retry: RetryPolicy,
    pub layout: LayoutMaintenanceConfig,
    /// Cadence of the age-trigger check
    pub age_check_period: Duration,
    pub rollup_interval: Duration,
    pub ping_interval: Duration,
}

impl Default for IngestWorkerConfig {
    fn default() -> Self {
        Self {
            buffer: BatchBufferConfig::default(),
            retry: RetryPolicy::default(),
            layout: LayoutMaintenanceConfig::default(),
            age_check_period: Duration::from_secs(1),
            rollup_interval: Duration::from_secs(60 * 60),
            ping_interval: Duration::from_secs(15),
        }
    }
}

/// Wires buffer, commit engine and maintenance into runnable processes.
pub struct IngestWorker {
    service: IngestionService,
    buffer: Arc<BatchBuffer>,
    flush_worker: FlushWorker,
    layout: LayoutMaintenance,
    rollups: RollupMaintenance,
    ping: StoragePing,
    age_check_period: Duration,
}

impl IngestWorker {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        partitions: Arc<dyn PartitionStore>,
        provisioner: Option<Arc<dyn PartitionProvisioner>>,
        rollup_store: Arc<dyn RollupStore>,
        dead_letter: Arc<dyn DeadLetterSink>,
        config: IngestWorkerConfig,
    ) -> Self {
        info!(
            max_batch_size = config.buffer.max_batch_size,
            max_attempts = config.retry.max_attempts,
            "initializing ingest worker"
        );

        let stats = Arc::new(IngestStats::new());
        let (flush_tx, flush_rx) = mpsc::channel(config.buffer.flush_queue_depth);
        let buffer = Arc::new(BatchBuffer::new(config.buffer.clone(), flush_tx));

        let engine = CommitEngine::new(
            store.clone(),
            provisioner,
            config.retry.clone(),
            stats.clone(),
        );
        let flush_worker = FlushWorker::new(
            flush_rx,
            buffer.clone(),
            engine,
            stats.clone(),
            dead_letter,
        );

        let service = IngestionService::new(buffer.clone(), stats.clone());
        let layout = LayoutMaintenance::new(partitions, config.layout.clone());
        let rollups = RollupMaintenance::new(rollup_store, config.rollup_interval);
        let ping = StoragePing::new(store, stats, config.ping_interval);

        Self {
            service,
            buffer,
            flush_worker,
            layout,
            rollups,
            ping,
            age_check_period: config.age_check_period,
        }
    }

    /// The in-process API handed to the request layer
    pub fn service(&self) -> IngestionService {
        self.service.clone()
    }

    /// Run the initial layout pass before accepting traffic, so the first
    /// write never waits on DDL
    pub async fn prepare_layout(&self) -> IngestResult<()> {
        let now = chrono::Utc::now();
        let created = self.layout.ensure_partitions(now).await.map_err(|e| {
            IngestError::Storage(
                anyhow::Error::new(e).context("initial partition provisioning failed"),
            )
        })?;
        info!(created, "initial partition horizon ensured");
        Ok(())
    }

    pub fn into_runner_processes(self) -> Vec<WorkerProcess> {
        let age_buffer = self.buffer;
        let age_period = self.age_check_period;
        vec![
            Box::new({
                let worker = self.flush_worker;
                move |ctx| Box::pin(async move { worker.run(ctx).await })
            }),
            Box::new(move |ctx| Box::pin(run_age_trigger(age_buffer, age_period, ctx))),
            Box::new({
                let layout = self.layout;
                move |ctx| Box::pin(async move { layout.run(ctx).await })
            }),
            Box::new({
                let rollups = self.rollups;
                move |ctx| Box::pin(async move { rollups.run(ctx).await })
            }),
            Box::new({
                let ping = self.ping;
                move |ctx| Box::pin(async move { ping.run(ctx).await })
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylog_domain::{
        MockDeadLetterSink, MockPartitionStore, MockRollupStore, MockTelemetryStore, StoreError,
    };

    fn worker_with(partitions: MockPartitionStore) -> IngestWorker {
        IngestWorker::new(
            Arc::new(MockTelemetryStore::new()),
            Arc::new(partitions),
            None,
            Arc::new(MockRollupStore::new()),
            Arc::new(MockDeadLetterSink::new()),
            IngestWorkerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_prepare_layout_provisions_initial_horizon() {
        let mut partitions = MockPartitionStore::new();
        partitions
            .expect_existing_partitions()
            .times(1)
            .returning(|| Ok(Vec::new()));
        partitions
            .expect_create_partition()
            .times(3)
            .returning(|_| Ok(()));

        assert!(worker_with(partitions).prepare_layout().await.is_ok());
    }

    #[tokio::test]
    async fn test_prepare_layout_failure_surfaces_as_storage_error() {
        let mut partitions = MockPartitionStore::new();
        partitions
            .expect_existing_partitions()
            .times(1)
            .returning(|| Err(StoreError::Fatal("relation missing".to_string())));

        let error = worker_with(partitions).prepare_layout().await.unwrap_err();
        assert!(matches!(error, IngestError::Storage(_)));
    }
}
