use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tracing::debug;

use skylog_domain::{StoreResult, TelemetryRecord, TelemetryStore};

use crate::classify::classify_pg_error;
use crate::client::PostgresClient;
use crate::models::{insert_params, INSERT_COLUMNS};

/// PostgreSQL implementation of TelemetryStore.
///
/// Each commit attempt is one multi-row parameterized INSERT: at these
/// batch sizes the per-statement round trip dominates, so per-record
/// statements are reserved for poison-record isolation.
#[derive(Clone)]
pub struct PostgresTelemetryStore {
    client: PostgresClient,
}

impl PostgresTelemetryStore {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

/// Multi-row INSERT statement for `rows` records
fn bulk_insert_sql(rows: usize) -> String {
    let width = INSERT_COLUMNS.len();
    let mut sql = format!("INSERT INTO telemetry ({}) VALUES ", INSERT_COLUMNS.join(", "));
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..width {
            if col > 0 {
                sql.push_str(", ");
            }
            sql.push('$');
            sql.push_str(&(row * width + col + 1).to_string());
        }
        sql.push(')');
    }
    sql
}

#[async_trait]
impl TelemetryStore for PostgresTelemetryStore {
    async fn insert_batch(&self, records: &[TelemetryRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let conn = self.client.get_connection().await?;
        let sql = bulk_insert_sql(records.len());
        let params: Vec<&(dyn ToSql + Sync)> =
            records.iter().flat_map(insert_params).collect();

        let inserted = conn
            .execute(sql.as_str(), &params)
            .await
            .map_err(|e| classify_pg_error(&e))?;

        debug!(rows = inserted, "bulk insert committed");
        Ok(())
    }

    async fn insert_one(&self, record: &TelemetryRecord) -> StoreResult<()> {
        let conn = self.client.get_connection().await?;
        let sql = bulk_insert_sql(1);
        let params = insert_params(record);

        conn.execute(sql.as_str(), &params)
            .await
            .map_err(|e| classify_pg_error(&e))?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.client.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_insert_sql_single_row() {
        let sql = bulk_insert_sql(1);
        assert!(sql.starts_with("INSERT INTO telemetry (created_at, drone_id"));
        assert!(sql.ends_with("$36)"));
        assert_eq!(sql.matches('(').count(), 2);
    }

    #[test]
    fn test_bulk_insert_sql_numbers_parameters_across_rows() {
        let sql = bulk_insert_sql(3);
        // Second row starts where the first left off
        assert!(sql.contains("($37, $38"));
        assert!(sql.ends_with("$108)"));
        assert_eq!(sql.matches("), (").count(), 2);
    }
}
