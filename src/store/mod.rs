pub mod memory;
pub mod retry;
pub mod rocks;

use crate::error::StoreError;
use crate::model::{ContentRecord, LocationRecord};

pub use memory::MemoryCatalog;
pub use retry::RetryPolicy;
pub use rocks::RocksCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Another writer created the record first.
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    AlreadyPresent,
}

/// The shared catalog: content records keyed by content hash plus the
/// append-only location log.
///
/// Implementations must make `create_content` and `append_location_ref`
/// atomic at the store boundary so concurrent writers on any host converge.
pub trait Catalog: Send + Sync {
    /// Append one occurrence to the location log. Never deduplicates.
    fn record_location(&self, location: &LocationRecord) -> Result<(), StoreError>;

    /// Strongly consistent read of a content record.
    fn get_content(&self, content_hash: &str) -> Result<Option<ContentRecord>, StoreError>;

    /// Create-if-absent.
    fn create_content(&self, record: &ContentRecord) -> Result<CreateOutcome, StoreError>;

    /// Append `path_hash` to the record's list for `volume`, creating the list
    /// if missing and leaving it untouched if the hash is already there.
    fn append_location_ref(
        &self,
        content_hash: &str,
        volume: &str,
        path_hash: &str,
    ) -> Result<AppendOutcome, StoreError>;
}
