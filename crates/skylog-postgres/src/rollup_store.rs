use async_trait::async_trait;
use tracing::{debug, info};

use skylog_domain::{RollupStore, RollupWindow, StoreResult};

use crate::classify::classify_pg_error;
use crate::client::PostgresClient;

/// Materialized-view refresh for the daily and hourly rollups.
#[derive(Clone)]
pub struct PostgresRollupStore {
    client: PostgresClient,
}

impl PostgresRollupStore {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RollupStore for PostgresRollupStore {
    async fn refresh(&self, window: RollupWindow) -> StoreResult<()> {
        let conn = self.client.get_connection().await?;
        let view = window.view_name();

        // CONCURRENTLY keeps the previous rollup readable during the
        // rebuild; readers see the old or the new version, never a partial
        // one. A freshly created view has no data yet and rejects the
        // concurrent path, so fall back to a plain refresh once.
        let concurrent = format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {view}");
        match conn.batch_execute(&concurrent).await {
            Ok(()) => {
                info!(view = %view, "rollup refreshed");
                Ok(())
            }
            Err(e) if e.to_string().contains("has not been populated") => {
                debug!(view = %view, "first refresh, populating without CONCURRENTLY");
                conn.batch_execute(&format!("REFRESH MATERIALIZED VIEW {view}"))
                    .await
                    .map_err(|e| classify_pg_error(&e))?;
                info!(view = %view, "rollup populated");
                Ok(())
            }
            Err(e) => Err(classify_pg_error(&e)),
        }
    }
}
