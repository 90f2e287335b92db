use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use skylog_domain::partition::{parse_partition_name, partition_for, PartitionSpec};
use skylog_domain::{PartitionProvisioner, PartitionStore, StoreResult};

use crate::classify::classify_pg_error;
use crate::client::PostgresClient;

/// PostgreSQL implementation of the partition lifecycle.
///
/// Index definitions are derived from the declared query patterns in one
/// place (`partition_ddl`); a new hot query pattern lands here, not in
/// application code.
#[derive(Clone)]
pub struct PostgresPartitionManager {
    client: PostgresClient,
}

impl PostgresPartitionManager {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

/// DDL for one monthly partition and its index set.
///
/// - BRIN on created_at: range summary suited to append-only, monotonically
///   increasing timestamps
/// - (drone_id, created_at DESC): drone-scoped time-range lookups
/// - (data_source, created_at DESC): per-source analytics
/// - covering index on created_at bundling hot projected columns
/// - partial index restricted to armed (in-flight) records
pub fn partition_ddl(spec: &PartitionSpec) -> Vec<String> {
    let name = &spec.name;
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {name} PARTITION OF telemetry \
             FOR VALUES FROM ('{}') TO ('{}')",
            spec.lower.to_rfc3339(),
            spec.upper.to_rfc3339()
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {name}_created_brin ON {name} USING brin (created_at)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {name}_drone_created ON {name} (drone_id, created_at DESC)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {name}_source_created ON {name} (data_source, created_at DESC)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {name}_created_covering ON {name} (created_at) \
             INCLUDE (drone_id, bat_v, alt, gps_lat, gps_lon)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {name}_armed_partial ON {name} \
             (drone_id, created_at DESC) WHERE armed"
        ),
    ]
}

#[async_trait]
impl PartitionStore for PostgresPartitionManager {
    async fn existing_partitions(&self) -> StoreResult<Vec<PartitionSpec>> {
        let conn = self.client.get_connection().await?;
        let rows = conn
            .query(
                "SELECT c.relname
                 FROM pg_inherits i
                 JOIN pg_class c ON c.oid = i.inhrelid
                 JOIN pg_class p ON p.oid = i.inhparent
                 WHERE p.relname = 'telemetry'
                 ORDER BY c.relname",
                &[],
            )
            .await
            .map_err(|e| classify_pg_error(&e))?;

        let mut specs = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0);
            match parse_partition_name(&name) {
                Some(spec) => specs.push(spec),
                // A manually attached partition outside the naming scheme is
                // left alone by planning
                None => warn!(partition = %name, "unrecognized partition name, skipping"),
            }
        }
        Ok(specs)
    }

    async fn create_partition(&self, spec: &PartitionSpec) -> StoreResult<()> {
        let conn = self.client.get_connection().await?;
        for statement in partition_ddl(spec) {
            conn.batch_execute(&statement)
                .await
                .map_err(|e| classify_pg_error(&e))?;
        }
        info!(
            partition = %spec.name,
            lower = %spec.lower,
            upper = %spec.upper,
            "partition ensured"
        );
        Ok(())
    }

    async fn drop_partition(&self, name: &str) -> StoreResult<()> {
        // Guard against injection through catalog-sourced names
        if parse_partition_name(name).is_none() {
            return Err(skylog_domain::StoreError::Fatal(format!(
                "refusing to drop non-telemetry table: {name}"
            )));
        }

        let conn = self.client.get_connection().await?;
        // DROP TABLE removes the partition and its indexes atomically
        conn.batch_execute(&format!("DROP TABLE IF EXISTS {name}"))
            .await
            .map_err(|e| classify_pg_error(&e))?;
        info!(partition = %name, "partition retired");
        Ok(())
    }
}

#[async_trait]
impl PartitionProvisioner for PostgresPartitionManager {
    async fn ensure_covering(&self, timestamps: &[DateTime<Utc>]) -> StoreResult<()> {
        let mut months: Vec<PartitionSpec> = Vec::new();
        for ts in timestamps {
            let spec = partition_for(*ts);
            if !months.iter().any(|m| m.name == spec.name) {
                months.push(spec);
            }
        }
        for spec in months {
            self.create_partition(&spec).await?;
        }
        Ok(())
    }
}
