pub mod config;
pub mod engine;
pub mod error;
pub mod file_proc;
pub mod merge;
pub mod model;
pub mod progress;
pub mod store;
pub mod utils;
pub mod volume;

pub use config::AppConfig;
pub use engine::IndexEngine;
pub use error::{Error, FileError, StoreError};
pub use file_proc::hash::HashAlgorithm;
pub use file_proc::stats::RunSummary;
pub use merge::{MergeEngine, MergeOutcome};
pub use model::{ContentRecord, ContentStatus, LocationRecord, UNKNOWN_VOLUME};
pub use progress::{ProgressReporter, SilentReporter};
