pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::adapters::storage::{LocalBlobStore, MemoryBlobStore};
#[cfg(feature = "s3")]
pub use crate::adapters::storage::S3BlobStore;
pub use crate::adapters::warehouse::HttpWarehouse;
pub use crate::config::TomlConfig;
pub use crate::core::{Loader, Orchestrator, OrchestratorSettings, StagingStore};
pub use crate::domain::model::{BatchState, TargetMonth};
pub use crate::utils::error::{ReconError, Result};
