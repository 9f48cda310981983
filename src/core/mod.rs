pub mod loader;
pub mod normalizer;
pub mod orchestrator;
pub mod source;
pub mod staging;
pub mod validator;

pub use crate::domain::ports::{BlobStore, Warehouse};
pub use crate::utils::error::Result;
pub use loader::{Loader, PollSettings};
pub use normalizer::{ExcessPrecisionPolicy, Normalizer};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use source::{RawSheet, RawSpreadsheet, SourceLayout};
pub use staging::{CancelOutcome, StagingStore};
pub use validator::validate;
