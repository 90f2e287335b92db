use serde::{Deserialize, Serialize};

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: usize,
    /// Upper bound on waiting for a pooled connection; exceeding it is
    /// surfaced as PoolExhausted instead of blocking the caller
    pub acquire_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "skylog".to_string(),
            username: "skylog".to_string(),
            password: "skylog".to_string(),
            max_pool_size: 10,
            acquire_timeout_secs: 5,
        }
    }
}
