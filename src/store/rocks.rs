use super::{AppendOutcome, Catalog, CreateOutcome};
use crate::error::StoreError;
use crate::model::{ContentRecord, ContentStatus, LocationRecord};
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, MergeOperands, Options, DB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

pub const DEFAULT_FILES_TABLE: &str = "HashFS-Files";
pub const DEFAULT_LOCATIONS_TABLE: &str = "HashFS-Locations";

const CONTENT_MERGE_OPERATOR: &str = "hashfs.content.union";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentHeader {
    mime_type: String,
    size: u64,
    status: ContentStatus,
}

/// Stored value of a content record, and also the merge operand.
///
/// Merging is a union: the first header seen wins and path hashes are appended
/// to their volume's list when missing. The operation is associative,
/// commutative up to list order, and idempotent, so concurrent creators and
/// appenders converge without a read-modify-write.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentFragment {
    header: Option<ContentHeader>,
    locations: BTreeMap<String, Vec<String>>,
}

impl ContentFragment {
    fn from_record(record: &ContentRecord) -> Self {
        Self {
            header: Some(ContentHeader {
                mime_type: record.mime_type.clone(),
                size: record.size,
                status: record.status,
            }),
            locations: record.locations.clone(),
        }
    }

    fn location(volume: &str, path_hash: &str) -> Self {
        let mut locations = BTreeMap::new();
        locations.insert(volume.to_string(), vec![path_hash.to_string()]);
        Self {
            header: None,
            locations,
        }
    }

    fn absorb(&mut self, other: ContentFragment) {
        if self.header.is_none() {
            self.header = other.header;
        }
        for (volume, hashes) in other.locations {
            let existing = self.locations.entry(volume).or_default();
            for hash in hashes {
                if !existing.contains(&hash) {
                    existing.push(hash);
                }
            }
        }
    }

    /// A fragment without a header has only seen appends; the record does not
    /// exist yet as far as readers are concerned.
    fn into_record(self, content_hash: &str) -> Option<ContentRecord> {
        let header = self.header?;
        Some(ContentRecord {
            content_hash: content_hash.to_string(),
            mime_type: header.mime_type,
            size: header.size,
            status: header.status,
            locations: self.locations,
        })
    }
}

fn decode_fragment(bytes: &[u8]) -> Option<ContentFragment> {
    match bincode::deserialize(bytes) {
        Ok(fragment) => Some(fragment),
        Err(e) => {
            error!("Undecodable content fragment, failing the merge: {}", e);
            None
        }
    }
}

/// Folds `operands` into `existing`. Any undecodable value fails the whole
/// merge, which RocksDB reports as corruption on the next read.
fn merge_values<'a>(
    existing: Option<&[u8]>,
    operands: impl IntoIterator<Item = &'a [u8]>,
) -> Option<Vec<u8>> {
    let mut merged = match existing {
        Some(bytes) => Some(decode_fragment(bytes)?),
        None => None,
    };
    for operand in operands {
        let fragment = decode_fragment(operand)?;
        match merged.as_mut() {
            Some(current) => current.absorb(fragment),
            None => merged = Some(fragment),
        }
    }
    merged.and_then(|fragment| bincode::serialize(&fragment).ok())
}

fn merge_content(
    _key: &[u8],
    existing: Option<&[u8]>,
    operands: &MergeOperands,
) -> Option<Vec<u8>> {
    merge_values(existing, operands.iter())
}

/// Catalog persisted in RocksDB. One column family holds content records, the
/// other the location log; both are named after the catalog tables.
pub struct RocksCatalog {
    db: DB,
    files_table: String,
    locations_table: String,
    sequence: AtomicU64,
}

impl RocksCatalog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_tables(path, DEFAULT_FILES_TABLE, DEFAULT_LOCATIONS_TABLE)
    }

    pub fn open_with_tables(
        path: impl AsRef<Path>,
        files_table: &str,
        locations_table: &str,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        db_options.create_missing_column_families(true);

        let mut content_options = Options::default();
        content_options.set_merge_operator_associative(CONTENT_MERGE_OPERATOR, merge_content);

        let descriptors = vec![
            ColumnFamilyDescriptor::new(files_table, content_options),
            ColumnFamilyDescriptor::new(locations_table, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&db_options, path, descriptors)?;
        debug!(
            "Opened catalog at {} (tables '{}', '{}')",
            path.display(),
            files_table,
            locations_table
        );

        Ok(Self {
            db,
            files_table: files_table.to_string(),
            locations_table: locations_table.to_string(),
            sequence: AtomicU64::new(0),
        })
    }

    fn table(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Permanent(format!("missing table '{}'", name)))
    }

    fn merge_fragment(&self, content_hash: &str, fragment: &ContentFragment) -> Result<(), StoreError> {
        let value = bincode::serialize(fragment).map_err(|source| StoreError::Codec {
            key: content_hash.to_string(),
            source,
        })?;
        let table = self.table(&self.files_table)?;
        self.db.merge_cf(table, content_hash.as_bytes(), value)?;
        Ok(())
    }

    /// Every content record, ordered by content hash.
    pub fn contents(&self) -> Result<Vec<ContentRecord>, StoreError> {
        let table = self.table(&self.files_table)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(table, IteratorMode::Start) {
            let (key, value) = item?;
            let content_hash = String::from_utf8_lossy(&key).into_owned();
            let fragment: ContentFragment =
                bincode::deserialize(&value).map_err(|source| StoreError::Codec {
                    key: content_hash.clone(),
                    source,
                })?;
            if let Some(record) = fragment.into_record(&content_hash) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn locations(&self) -> Result<Vec<LocationRecord>, StoreError> {
        let table = self.table(&self.locations_table)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(table, IteratorMode::Start) {
            let (key, value) = item?;
            let record = bincode::deserialize(&value).map_err(|source| StoreError::Codec {
                key: String::from_utf8_lossy(&key).into_owned(),
                source,
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl Catalog for RocksCatalog {
    fn record_location(&self, location: &LocationRecord) -> Result<(), StoreError> {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}|{:020}|{:010}", location.host_path_hash, nanos, sequence);
        let value = bincode::serialize(location).map_err(|source| StoreError::Codec {
            key: key.clone(),
            source,
        })?;
        let table = self.table(&self.locations_table)?;
        self.db.put_cf(table, key.as_bytes(), value)?;
        Ok(())
    }

    fn get_content(&self, content_hash: &str) -> Result<Option<ContentRecord>, StoreError> {
        let table = self.table(&self.files_table)?;
        match self.db.get_cf(table, content_hash.as_bytes())? {
            Some(value) => {
                let fragment: ContentFragment =
                    bincode::deserialize(&value).map_err(|source| StoreError::Codec {
                        key: content_hash.to_string(),
                        source,
                    })?;
                Ok(fragment.into_record(content_hash))
            }
            None => Ok(None),
        }
    }

    /// Creation is a merge of the full record, so a losing concurrent creator
    /// folds its locations into the winner's record instead of overwriting it.
    fn create_content(&self, record: &ContentRecord) -> Result<CreateOutcome, StoreError> {
        if self.get_content(&record.content_hash)?.is_some() {
            return Ok(CreateOutcome::AlreadyExists);
        }
        self.merge_fragment(&record.content_hash, &ContentFragment::from_record(record))?;
        Ok(CreateOutcome::Created)
    }

    fn append_location_ref(
        &self,
        content_hash: &str,
        volume: &str,
        path_hash: &str,
    ) -> Result<AppendOutcome, StoreError> {
        if let Some(existing) = self.get_content(content_hash)? {
            if existing.has_location(volume, path_hash) {
                return Ok(AppendOutcome::AlreadyPresent);
            }
        }
        self.merge_fragment(content_hash, &ContentFragment::location(volume, path_hash))?;
        Ok(AppendOutcome::Appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fragment_union_is_idempotent() {
        let mut fragment = ContentFragment::from_record(&ContentRecord::first_seen(
            "sha256:c", "text/plain", 5, "vol-1", "sha256:a",
        ));
        fragment.absorb(ContentFragment::location("vol-1", "sha256:a"));
        fragment.absorb(ContentFragment::location("vol-1", "sha256:b"));
        fragment.absorb(ContentFragment::location("vol-1", "sha256:b"));
        assert_eq!(fragment.locations["vol-1"], vec!["sha256:a", "sha256:b"]);
    }

    #[test]
    fn test_first_header_wins() {
        let mut fragment = ContentFragment::location("vol-1", "sha256:a");
        assert!(fragment.clone().into_record("sha256:c").is_none());

        fragment.absorb(ContentFragment::from_record(&ContentRecord::first_seen(
            "sha256:c", "text/plain", 5, "vol-2", "sha256:b",
        )));
        fragment.absorb(ContentFragment::from_record(&ContentRecord::first_seen(
            "sha256:c", "image/png", 9, "vol-2", "sha256:b",
        )));
        let record = fragment.into_record("sha256:c").unwrap();
        assert_eq!(record.mime_type, "text/plain");
        assert_eq!(record.size, 5);
        assert_eq!(record.location_count(), 2);
    }

    #[test]
    fn test_corrupt_value_fails_the_merge() {
        let append = bincode::serialize(&ContentFragment::location("vol-1", "sha256:a")).unwrap();
        assert!(merge_values(Some(b"\xff\xff not a fragment".as_slice()), [append.as_slice()]).is_none());
        assert!(merge_values(None, [b"\xff".as_slice()]).is_none());

        let merged = merge_values(None, [append.as_slice(), append.as_slice()]).unwrap();
        let fragment: ContentFragment = bincode::deserialize(&merged).unwrap();
        assert_eq!(fragment.locations["vol-1"], vec!["sha256:a"]);
    }

    #[test]
    fn test_corrupt_record_surfaces_as_permanent_error() {
        let dir = tempdir().unwrap();
        let catalog = RocksCatalog::open(dir.path().join("catalog")).unwrap();
        let table = catalog.table(DEFAULT_FILES_TABLE).unwrap();
        catalog.db.put_cf(table, b"sha256:c", b"\xff\xff not a fragment").unwrap();
        catalog
            .merge_fragment("sha256:c", &ContentFragment::location("vol-1", "sha256:a"))
            .unwrap();

        let err = catalog.get_content("sha256:c").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rocks_create_and_append() {
        let dir = tempdir().unwrap();
        let catalog = RocksCatalog::open(dir.path().join("catalog")).unwrap();

        assert!(catalog.get_content("sha256:c").unwrap().is_none());
        let record = ContentRecord::first_seen("sha256:c", "text/plain", 5, "vol-1", "sha256:a");
        assert_eq!(catalog.create_content(&record).unwrap(), CreateOutcome::Created);
        assert_eq!(catalog.create_content(&record).unwrap(), CreateOutcome::AlreadyExists);

        assert_eq!(
            catalog.append_location_ref("sha256:c", "vol-1", "sha256:b").unwrap(),
            AppendOutcome::Appended
        );
        assert_eq!(
            catalog.append_location_ref("sha256:c", "vol-1", "sha256:b").unwrap(),
            AppendOutcome::AlreadyPresent
        );

        let stored = catalog.get_content("sha256:c").unwrap().unwrap();
        assert_eq!(stored.locations["vol-1"], vec!["sha256:a", "sha256:b"]);
        assert_eq!(stored.status, ContentStatus::Initial);
        assert_eq!(catalog.contents().unwrap().len(), 1);
    }

    #[test]
    fn test_catalog_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog");
        {
            let catalog = RocksCatalog::open_with_tables(&path, "Files", "Locations").unwrap();
            let record = ContentRecord::first_seen("md5:c", "text/plain", 1, "vol-9", "md5:a");
            catalog.create_content(&record).unwrap();
        }
        let catalog = RocksCatalog::open_with_tables(&path, "Files", "Locations").unwrap();
        let stored = catalog.get_content("md5:c").unwrap().unwrap();
        assert!(stored.has_location("vol-9", "md5:a"));
    }
}
