mod config;
mod runner;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use config::ServiceConfig;
use ingest_worker::{
    BatchBufferConfig, IngestWorker, IngestWorkerConfig, LoggingDeadLetter, RetryPolicy,
};
use ingest_worker::maintenance::LayoutMaintenanceConfig;
use runner::Runner;
use skylog_domain::{PartitionProvisioner, PartitionStore};
use skylog_postgres::{
    ensure_schema, PostgresClient, PostgresConfig, PostgresPartitionManager, PostgresRollupStore,
    PostgresTelemetryStore, StorageDiagnostics,
};
use telemetry::init_telemetry;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&config.log_level) {
        eprintln!("Failed to initialize telemetry: {e}");
        std::process::exit(1);
    }

    info!(
        max_batch_size = config.max_batch_size,
        retention_months = config.retention_months,
        "starting skylog-all-in-one"
    );
    debug!("configuration: {config:?}");

    let (worker, diagnostics) = match initialize(&config).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("failed to initialize storage: {e:#}");
            std::process::exit(1);
        }
    };

    let service = worker.service();

    let mut runner = Runner::new();
    let names = ["flush_worker", "age_trigger", "layout", "rollups", "ping"];
    for (name, process) in names.iter().zip(worker.into_runner_processes()) {
        runner = runner.with_named_process(*name, process);
    }

    // Periodic operational status line from the in-memory snapshot
    let status_service = service.clone();
    runner = runner.with_named_process(
        "status_reporter",
        Box::new(move |ctx| {
            Box::pin(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(60));
                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tick.tick() => {
                            let status = status_service.status();
                            info!(
                                buffered = status.buffered_records,
                                committed = status.records_committed,
                                failed = status.records_failed,
                                retries = status.retry_count,
                                storage_healthy = status.storage_healthy,
                                "ingestion status"
                            );
                        }
                    }
                }
                Ok(())
            })
        }),
    );

    // Periodic layout statistics off the hot path: partition sizes and
    // row counts from the catalog views
    let diagnostics_interval = Duration::from_secs(config.diagnostics_interval_secs);
    runner = runner.with_named_process(
        "layout_stats",
        Box::new(move |ctx| {
            Box::pin(async move {
                let mut tick = tokio::time::interval(diagnostics_interval);
                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tick.tick() => {
                            match diagnostics.partition_stats().await {
                                Ok(stats) => {
                                    let live_rows: i64 = stats.iter().map(|s| s.live_rows).sum();
                                    let total_bytes: i64 = stats.iter().map(|s| s.total_bytes).sum();
                                    info!(
                                        partitions = stats.len(),
                                        live_rows,
                                        total_bytes,
                                        "storage layout stats"
                                    );
                                }
                                Err(e) => warn!("partition stats query failed: {e}"),
                            }
                        }
                    }
                }
                Ok(())
            })
        }),
    );

    runner = runner
        .with_closer(|| async move {
            info!("shutdown complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    if runner.run().await {
        std::process::exit(0);
    }
    std::process::exit(1);
}

/// Connect to PostgreSQL, bootstrap the schema and wire the ingest worker
async fn initialize(
    config: &ServiceConfig,
) -> anyhow::Result<(IngestWorker, StorageDiagnostics)> {
    info!("initializing PostgreSQL");
    let client = PostgresClient::new(&PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
        acquire_timeout_secs: config.postgres_acquire_timeout_secs,
    })?;
    client
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("postgres unreachable: {e}"))?;
    ensure_schema(&client)
        .await
        .map_err(|e| anyhow::anyhow!("schema bootstrap failed: {e}"))?;

    let store = Arc::new(PostgresTelemetryStore::new(client.clone()));
    let partitions = Arc::new(PostgresPartitionManager::new(client.clone()));
    let rollups = Arc::new(PostgresRollupStore::new(client.clone()));
    let diagnostics = StorageDiagnostics::new(client);
    let dead_letter = Arc::new(LoggingDeadLetter::new());

    let worker = IngestWorker::new(
        store,
        partitions.clone() as Arc<dyn PartitionStore>,
        Some(partitions as Arc<dyn PartitionProvisioner>),
        rollups,
        dead_letter,
        worker_config(config),
    );
    worker.prepare_layout().await?;

    Ok((worker, diagnostics))
}

fn worker_config(config: &ServiceConfig) -> IngestWorkerConfig {
    IngestWorkerConfig {
        buffer: BatchBufferConfig {
            max_batch_size: config.max_batch_size,
            max_batch_age: Duration::from_secs(config.max_batch_age_secs),
            flush_queue_depth: config.flush_queue_depth,
        },
        retry: RetryPolicy {
            max_attempts: config.retry_max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        },
        layout: LayoutMaintenanceConfig {
            interval: Duration::from_secs(config.layout_interval_secs),
            horizon_months: config.partition_horizon_months,
            retention_months: config.retention_months,
        },
        rollup_interval: Duration::from_secs(config.rollup_interval_secs),
        ping_interval: Duration::from_secs(config.ping_interval_secs),
        ..IngestWorkerConfig::default()
    }
}
