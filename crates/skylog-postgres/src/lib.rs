mod classify;
mod client;
mod config;
mod diagnostics;
mod models;
mod partition_manager;
mod rollup_store;
mod schema;
mod telemetry_repository;

pub use classify::{classify_pg_error, classify_sqlstate};
pub use client::PostgresClient;
pub use config::PostgresConfig;
pub use diagnostics::StorageDiagnostics;
pub use models::{IndexUsage, PartitionStat};
pub use partition_manager::{partition_ddl, PostgresPartitionManager};
pub use rollup_store::PostgresRollupStore;
pub use schema::ensure_schema;
pub use telemetry_repository::PostgresTelemetryStore;
