use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Connection pool size
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Upper bound on waiting for a pooled connection, in seconds
    #[serde(default = "default_postgres_acquire_timeout_secs")]
    pub postgres_acquire_timeout_secs: u64,

    // Batching configuration
    /// Records per batch before an automatic flush
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Max age of the oldest buffered record before a flush, in seconds
    #[serde(default = "default_max_batch_age_secs")]
    pub max_batch_age_secs: u64,

    /// Batches allowed to queue for the flush worker before producers
    /// are pushed back
    #[serde(default = "default_flush_queue_depth")]
    pub flush_queue_depth: usize,

    // Retry configuration
    /// Bulk-insert attempts per batch
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    // Partition layout configuration
    /// Months of future partitions kept provisioned
    #[serde(default = "default_partition_horizon_months")]
    pub partition_horizon_months: u32,

    /// Months of data kept before a partition is dropped
    #[serde(default = "default_retention_months")]
    pub retention_months: u32,

    /// Seconds between layout maintenance passes
    #[serde(default = "default_layout_interval_secs")]
    pub layout_interval_secs: u64,

    // Maintenance cadences
    /// Seconds between rollup refresh cycles
    #[serde(default = "default_rollup_interval_secs")]
    pub rollup_interval_secs: u64,

    /// Seconds between storage connectivity probes
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Seconds between storage layout statistics log lines
    #[serde(default = "default_diagnostics_interval_secs")]
    pub diagnostics_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "skylog".to_string()
}

fn default_postgres_username() -> String {
    "skylog".to_string()
}

fn default_postgres_password() -> String {
    "skylog".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_acquire_timeout_secs() -> u64 {
    5
}

// Batching defaults
fn default_max_batch_size() -> usize {
    500
}

fn default_max_batch_age_secs() -> u64 {
    30
}

fn default_flush_queue_depth() -> usize {
    4
}

// Retry defaults
fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

// Partition layout defaults
fn default_partition_horizon_months() -> u32 {
    3
}

fn default_retention_months() -> u32 {
    12
}

fn default_layout_interval_secs() -> u64 {
    6 * 60 * 60
}

// Maintenance defaults
fn default_rollup_interval_secs() -> u64 {
    60 * 60
}

fn default_ping_interval_secs() -> u64 {
    15
}

fn default_diagnostics_interval_secs() -> u64 {
    10 * 60
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("SKYLOG"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::remove_var("SKYLOG_MAX_BATCH_SIZE");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_batch_size, 500);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.retention_months, 12);
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::set_var("SKYLOG_MAX_BATCH_SIZE", "100");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.max_batch_size, 100);

        std::env::remove_var("SKYLOG_MAX_BATCH_SIZE");
    }
}
