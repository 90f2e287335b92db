use std::time::Duration;

use anyhow::Result;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::debug;

use skylog_domain::{StoreError, StoreResult};

use crate::config::PostgresConfig;

/// PostgreSQL client wrapper with connection pooling.
///
/// One pool per process, constructed explicitly and passed to every
/// component that needs storage access.
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
    acquire_timeout: Duration,
}

impl PostgresClient {
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        pool.resize(config.max_pool_size);

        Ok(Self {
            pool,
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        })
    }

    /// Pings the database to verify connectivity
    pub async fn ping(&self) -> StoreResult<()> {
        let client = self.get_connection().await?;
        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        debug!("postgreSQL connection successful");
        Ok(())
    }

    /// Gets a connection from the pool, bounded by the acquisition timeout.
    /// Never blocks indefinitely: a starved pool surfaces as PoolExhausted.
    pub async fn get_connection(&self) -> StoreResult<deadpool_postgres::Client> {
        match tokio::time::timeout(self.acquire_timeout, self.pool.get()).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => Err(StoreError::PoolExhausted(e.to_string())),
            Err(_) => Err(StoreError::PoolExhausted(format!(
                "no connection within {:?}",
                self.acquire_timeout
            ))),
        }
    }
}
