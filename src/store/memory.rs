use super::{AppendOutcome, Catalog, CreateOutcome};
use crate::error::StoreError;
use crate::model::{ContentRecord, LocationRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Mutex;

/// In-process catalog. DashMap shard locks give the atomic create and append
/// primitives; used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    contents: DashMap<String, ContentRecord>,
    locations: Mutex<Vec<LocationRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_count(&self) -> usize {
        self.contents.len()
    }

    pub fn contents(&self) -> Vec<ContentRecord> {
        let mut records: Vec<ContentRecord> =
            self.contents.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));
        records
    }

    pub fn locations(&self) -> Vec<LocationRecord> {
        self.locations
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn location_count(&self) -> usize {
        self.locations.lock().map(|log| log.len()).unwrap_or(0)
    }
}

impl Catalog for MemoryCatalog {
    fn record_location(&self, location: &LocationRecord) -> Result<(), StoreError> {
        let mut log = self
            .locations
            .lock()
            .map_err(|e| StoreError::Permanent(format!("location log poisoned: {}", e)))?;
        log.push(location.clone());
        Ok(())
    }

    fn get_content(&self, content_hash: &str) -> Result<Option<ContentRecord>, StoreError> {
        Ok(self.contents.get(content_hash).map(|r| r.value().clone()))
    }

    fn create_content(&self, record: &ContentRecord) -> Result<CreateOutcome, StoreError> {
        match self.contents.entry(record.content_hash.clone()) {
            Entry::Occupied(_) => Ok(CreateOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(CreateOutcome::Created)
            }
        }
    }

    fn append_location_ref(
        &self,
        content_hash: &str,
        volume: &str,
        path_hash: &str,
    ) -> Result<AppendOutcome, StoreError> {
        match self.contents.get_mut(content_hash) {
            Some(mut record) => {
                if record.add_location(volume, path_hash) {
                    Ok(AppendOutcome::Appended)
                } else {
                    Ok(AppendOutcome::AlreadyPresent)
                }
            }
            None => Err(StoreError::Permanent(format!(
                "no content record '{}' to append to",
                content_hash
            ))),
        }
    }
}
