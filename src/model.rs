use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Volume id used when a mount point has no known backing volume.
pub const UNKNOWN_VOLUME: &str = "UNKNOWN-VOLUME";

/// Lifecycle tag on a content record. The indexer only ever writes `Initial`;
/// later pipelines move records forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentStatus {
    Initial,
    Checked,
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentStatus::Initial => f.write_str("INITIAL"),
            ContentStatus::Checked => f.write_str("CHECKED"),
        }
    }
}

/// Canonical catalog entry for one distinct content, keyed by `content_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentRecord {
    pub content_hash: String,
    #[serde(rename = "Type")]
    pub mime_type: String,
    pub size: u64,
    pub status: ContentStatus,
    /// volume id -> volume path hashes, no duplicates per volume.
    pub locations: BTreeMap<String, Vec<String>>,
}

impl ContentRecord {
    /// Record for a first observation: one location, `INITIAL` status.
    pub fn first_seen(
        content_hash: &str,
        mime_type: &str,
        size: u64,
        volume: &str,
        path_hash: &str,
    ) -> Self {
        let mut locations = BTreeMap::new();
        locations.insert(volume.to_string(), vec![path_hash.to_string()]);
        Self {
            content_hash: content_hash.to_string(),
            mime_type: mime_type.to_string(),
            size,
            status: ContentStatus::Initial,
            locations,
        }
    }

    pub fn has_location(&self, volume: &str, path_hash: &str) -> bool {
        self.locations
            .get(volume)
            .map_or(false, |hashes| hashes.iter().any(|h| h == path_hash))
    }

    /// Append-if-missing. Returns `true` when the reference was added.
    pub fn add_location(&mut self, volume: &str, path_hash: &str) -> bool {
        let hashes = self.locations.entry(volume.to_string()).or_default();
        if hashes.iter().any(|h| h == path_hash) {
            return false;
        }
        hashes.push(path_hash.to_string());
        true
    }

    pub fn location_count(&self) -> usize {
        self.locations.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessMode {
    /// Octal permission bits, e.g. `0644`.
    pub numeric: String,
    /// `ls`-style rendering, e.g. `rw-r--r--`.
    pub symbolic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Timestamp {
    pub epoch: f64,
    #[serde(rename = "ISO8601")]
    pub iso8601: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Timestamps {
    pub access: Timestamp,
    pub modify: Timestamp,
    pub change: Timestamp,
}

/// One physical occurrence of a file. Written once per observation and never
/// deduplicated against earlier observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationRecord {
    pub volume: String,
    pub volume_path: String,
    pub volume_path_hash: String,
    pub host: String,
    pub host_path: String,
    pub host_path_hash: String,
    pub content_hash: String,
    pub owner: Principal,
    pub group: Principal,
    pub access_mode: AccessMode,
    pub timestamps: Timestamps,
}

/// Content-level facts observed alongside a location; only used when the
/// content record has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFacts {
    pub mime_type: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_location_is_append_if_missing() {
        let mut record = ContentRecord::first_seen("sha256:aa", "text/plain", 5, "vol-1", "sha256:p1");
        assert!(!record.add_location("vol-1", "sha256:p1"));
        assert!(record.add_location("vol-1", "sha256:p2"));
        assert!(record.add_location("vol-2", "sha256:p1"));
        assert_eq!(record.locations["vol-1"], vec!["sha256:p1", "sha256:p2"]);
        assert_eq!(record.location_count(), 3);
        assert!(record.has_location("vol-2", "sha256:p1"));
        assert!(!record.has_location("vol-3", "sha256:p1"));
    }

    #[test]
    fn test_first_seen_is_initial() {
        let record = ContentRecord::first_seen("md5:00", "application/pdf", 1, "vol-1", "md5:11");
        assert_eq!(record.status, ContentStatus::Initial);
        assert_eq!(record.status.to_string(), "INITIAL");
    }
}
