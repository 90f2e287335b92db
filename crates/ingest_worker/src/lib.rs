pub mod batch_buffer;
pub mod commit_engine;
pub mod dead_letter;
pub mod flush_worker;
pub mod ingest_worker;
pub mod ingestion_service;
pub mod maintenance;
pub mod stats;

pub use batch_buffer::{BatchBuffer, BatchBufferConfig, FlushRequest};
pub use commit_engine::{CommitEngine, RetryPolicy};
pub use dead_letter::LoggingDeadLetter;
pub use flush_worker::FlushWorker;
pub use ingest_worker::{IngestWorker, IngestWorkerConfig, WorkerProcess};
pub use ingestion_service::IngestionService;
pub use maintenance::{LayoutMaintenance, LayoutMaintenanceConfig, RollupMaintenance, StoragePing};
pub use stats::IngestStats;
