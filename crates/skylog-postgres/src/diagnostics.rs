use tracing::debug;

use skylog_domain::StoreResult;

use crate::classify::classify_pg_error;
use crate::client::PostgresClient;
use crate::models::{IndexUsage, PartitionStat};

const PARTITION_STATS_SQL: &str = "
SELECT c.relname,
       pg_total_relation_size(c.oid),
       COALESCE(s.n_live_tup, 0)::bigint
FROM pg_inherits i
JOIN pg_class c ON c.oid = i.inhrelid
JOIN pg_class p ON p.oid = i.inhparent
LEFT JOIN pg_stat_user_tables s ON s.relid = c.oid
WHERE p.relname = 'telemetry'
ORDER BY c.relname";

const INDEX_USAGE_SQL: &str = "
SELECT indexrelname,
       COALESCE(idx_scan, 0)::bigint,
       pg_relation_size(indexrelid)
FROM pg_stat_user_indexes
WHERE relname LIKE 'telemetry_y%'
ORDER BY idx_scan DESC";

/// Read-only statistics queries for operational diagnostics.
///
/// These hit catalog views only and are never issued on the ingestion hot
/// path.
#[derive(Clone)]
pub struct StorageDiagnostics {
    client: PostgresClient,
}

impl StorageDiagnostics {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    /// Size and live-row count per telemetry partition
    pub async fn partition_stats(&self) -> StoreResult<Vec<PartitionStat>> {
        let conn = self.client.get_connection().await?;
        let rows = conn
            .query(PARTITION_STATS_SQL, &[])
            .await
            .map_err(|e| classify_pg_error(&e))?;

        let stats = rows
            .iter()
            .map(|row| PartitionStat {
                partition: row.get(0),
                total_bytes: row.get(1),
                live_rows: row.get(2),
            })
            .collect::<Vec<_>>();

        debug!(partitions = stats.len(), "collected partition stats");
        Ok(stats)
    }

    /// Scan counts and sizes for the per-partition index sets
    pub async fn index_usage(&self) -> StoreResult<Vec<IndexUsage>> {
        let conn = self.client.get_connection().await?;
        let rows = conn
            .query(INDEX_USAGE_SQL, &[])
            .await
            .map_err(|e| classify_pg_error(&e))?;

        Ok(rows
            .iter()
            .map(|row| IndexUsage {
                index: row.get(0),
                scans: row.get(1),
                size_bytes: row.get(2),
            })
            .collect())
    }
}
