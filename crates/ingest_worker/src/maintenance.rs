use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use skylog_domain::partition::{expired_partitions, missing_partitions};
use skylog_domain::{
    PartitionStore, RollupStore, RollupWindow, StoreResult, TelemetryStore,
    DEFAULT_HORIZON_MONTHS, DEFAULT_RETENTION_MONTHS,
};

use crate::stats::IngestStats;

/// Schedule and horizons for the periodic layout pass
#[derive(Debug, Clone)]
pub struct LayoutMaintenanceConfig {
    pub interval: Duration,
    pub horizon_months: u32,
    pub retention_months: u32,
}

impl Default for LayoutMaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6 * 60 * 60),
            horizon_months: DEFAULT_HORIZON_MONTHS,
            retention_months: DEFAULT_RETENTION_MONTHS,
        }
    }
}

/// Periodic partition lifecycle: pre-provision ahead of the write window,
/// retire beyond the retention horizon. Idempotent bodies, safe to invoke
/// redundantly; runs apart from ingestion and takes no ingestion locks.
pub struct LayoutMaintenance {
    partitions: Arc<dyn PartitionStore>,
    config: LayoutMaintenanceConfig,
}

impl LayoutMaintenance {
    pub fn new(partitions: Arc<dyn PartitionStore>, config: LayoutMaintenanceConfig) -> Self {
        Self { partitions, config }
    }

    /// Create any partition missing from `[month(as_of), +horizon)`.
    /// Returns how many were created; zero on a fully covered horizon.
    pub async fn ensure_partitions(&self, as_of: chrono::DateTime<Utc>) -> StoreResult<usize> {
        let existing = self.partitions.existing_partitions().await?;
        let plan = missing_partitions(&existing, as_of, self.config.horizon_months);
        let planned = plan.len();

        for spec in &plan {
            self.partitions.create_partition(spec).await?;
        }
        if planned > 0 {
            info!(created = planned, "partition horizon extended");
        }
        Ok(planned)
    }

    /// Drop every partition whose range fell wholly out of retention.
    /// Returns how many were dropped.
    pub async fn retire_expired(&self, now: chrono::DateTime<Utc>) -> StoreResult<usize> {
        let existing = self.partitions.existing_partitions().await?;
        let expired = expired_partitions(&existing, now, self.config.retention_months);
        let planned = expired.len();

        for spec in &expired {
            self.partitions.drop_partition(&spec.name).await?;
        }
        if planned > 0 {
            info!(dropped = planned, "expired partitions retired");
        }
        Ok(planned)
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tick.tick() => {
                    let now = Utc::now();
                    if let Err(e) = self.ensure_partitions(now).await {
                        error!("partition pre-provisioning failed: {e}");
                    }
                    if let Err(e) = self.retire_expired(now).await {
                        error!("partition retirement failed: {e}");
                    }
                }
            }
        }
        Ok(())
    }
}

/// Periodic rollup refresh. Each window refreshes independently so a
/// failing daily rebuild never blocks the hourly one.
pub struct RollupMaintenance {
    rollups: Arc<dyn RollupStore>,
    interval: Duration,
}

impl RollupMaintenance {
    pub fn new(rollups: Arc<dyn RollupStore>, interval: Duration) -> Self {
        Self { rollups, interval }
    }

    /// Refresh every window once; also the manual trigger. Returns the
    /// windows that failed.
    pub async fn refresh_all(&self) -> Vec<RollupWindow> {
        let mut failed = Vec::new();
        for window in RollupWindow::ALL {
            if let Err(e) = self.rollups.refresh(window).await {
                error!(view = %window, "rollup refresh failed: {e}");
                failed.push(window);
            }
        }
        failed
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tick.tick() => {
                    let failed = self.refresh_all().await;
                    if !failed.is_empty() {
                        warn!(failed = failed.len(), "rollup cycle finished with failures");
                    }
                }
            }
        }
        Ok(())
    }
}

/// Periodic connectivity probe feeding the health snapshot, so status
/// calls stay off the storage round trip.
pub struct StoragePing {
    store: Arc<dyn TelemetryStore>,
    stats: Arc<IngestStats>,
    interval: Duration,
}

impl StoragePing {
    pub fn new(store: Arc<dyn TelemetryStore>, stats: Arc<IngestStats>, interval: Duration) -> Self {
        Self {
            store,
            stats,
            interval,
        }
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tick.tick() => {
                    match self.store.ping().await {
                        Ok(()) => self.stats.set_storage_healthy(true),
                        Err(e) => {
                            warn!("storage ping failed: {e}");
                            self.stats.set_storage_healthy(false);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use skylog_domain::partition::{partition_for, partitions_covering};
    use skylog_domain::{MockPartitionStore, MockRollupStore, StoreError};

    fn layout_config() -> LayoutMaintenanceConfig {
        LayoutMaintenanceConfig {
            interval: Duration::from_secs(3600),
            horizon_months: 3,
            retention_months: 12,
        }
    }

    #[tokio::test]
    async fn test_ensure_partitions_creates_full_horizon() {
        let as_of = Utc.with_ymd_and_hms(2026, 8, 30, 0, 0, 0).unwrap();

        let mut partitions = MockPartitionStore::new();
        partitions
            .expect_existing_partitions()
            .times(1)
            .returning(|| Ok(Vec::new()));
        partitions
            .expect_create_partition()
            .times(3)
            .returning(|_| Ok(()));

        let maintenance = LayoutMaintenance::new(Arc::new(partitions), layout_config());
        assert_eq!(maintenance.ensure_partitions(as_of).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ensure_partitions_second_call_creates_nothing() {
        let as_of = Utc.with_ymd_and_hms(2026, 8, 30, 0, 0, 0).unwrap();
        let covered = partitions_covering(as_of, 3);

        let mut partitions = MockPartitionStore::new();
        partitions
            .expect_existing_partitions()
            .times(1)
            .returning(move || Ok(covered.clone()));
        partitions.expect_create_partition().times(0);

        let maintenance = LayoutMaintenance::new(Arc::new(partitions), layout_config());
        assert_eq!(maintenance.ensure_partitions(as_of).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retire_expired_spares_retention_window() {
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 0, 0, 0).unwrap();
        // One partition well past retention, one current
        let old = partition_for(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        let current = partition_for(now);
        let old_name = old.name.clone();
        let existing = vec![old, current];

        let mut partitions = MockPartitionStore::new();
        partitions
            .expect_existing_partitions()
            .times(1)
            .returning(move || Ok(existing.clone()));
        partitions
            .expect_drop_partition()
            .withf(move |name| name == old_name)
            .times(1)
            .returning(|_| Ok(()));

        let maintenance = LayoutMaintenance::new(Arc::new(partitions), layout_config());
        assert_eq!(maintenance.retire_expired(now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollup_failure_does_not_block_other_window() {
        let mut rollups = MockRollupStore::new();
        rollups
            .expect_refresh()
            .withf(|w| *w == RollupWindow::Daily)
            .times(1)
            .returning(|_| Err(StoreError::Transient("lock timeout".to_string())));
        rollups
            .expect_refresh()
            .withf(|w| *w == RollupWindow::Hourly)
            .times(1)
            .returning(|_| Ok(()));

        let maintenance =
            RollupMaintenance::new(Arc::new(rollups), Duration::from_secs(3600));
        let failed = maintenance.refresh_all().await;
        assert_eq!(failed, vec![RollupWindow::Daily]);
    }
}
