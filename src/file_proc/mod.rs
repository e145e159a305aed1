pub mod file_info;
pub mod hash;
pub mod mime;
pub mod scan;
pub mod stats;

use crate::error::FileError;
use crate::merge::{MergeEngine, MergeOutcome};
use crate::model::ContentFacts;
use crate::utils::path::relative_to;
use crate::volume::Volume;
use file_info::{FileFacts, IdentityTables, LocationDigests, LocationRecordBuilder};
use hash::HashAlgorithm;
use mime::MimeClassifier;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::trace;

/// Immutable per-run state shared by every worker.
pub struct RunContext<'a> {
    pub host: &'a str,
    pub algorithm: HashAlgorithm,
    pub identities: &'a IdentityTables,
    pub classifier: &'a dyn MimeClassifier,
    pub merge: MergeEngine<'a>,
}

/// Hash, describe and merge one file found on `volume`.
pub fn index_file(
    ctx: &RunContext<'_>,
    volume: &Volume,
    path: &Path,
) -> Result<MergeOutcome, FileError> {
    let metadata = fs::metadata(path).map_err(|e| FileError::io(path, e))?;
    let facts = FileFacts::from_metadata(path, &metadata);
    let digest = hash::hash_file(path, ctx.algorithm).map_err(|e| FileError::io(path, e))?;

    let volume_path = relative_to(path, &volume.mount_point).unwrap_or_else(|| {
        path.strip_prefix("/").unwrap_or(path).to_path_buf()
    });
    let digests = LocationDigests {
        host_path_hash: ctx.algorithm.hash(path.as_os_str().as_bytes()),
        volume_path_hash: ctx.algorithm.hash(volume_path.as_os_str().as_bytes()),
        content_hash: digest.content_hash,
    };

    let builder = LocationRecordBuilder {
        host: ctx.host,
        volume,
        identities: ctx.identities,
    };
    let location = builder.build(&facts, &volume_path.to_string_lossy(), digests);
    let content = ContentFacts {
        mime_type: ctx.classifier.classify(&digest.head),
        size: digest.bytes_read,
    };
    trace!(
        "{} -> {} ({}, {} bytes)",
        path.display(),
        location.content_hash,
        content.mime_type,
        content.size
    );

    ctx.merge
        .merge(&location, &content)
        .map_err(|source| FileError::Store {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Catalog, MemoryCatalog, RetryPolicy};
    use mime::FixedClassifier;
    use tempfile::tempdir;

    #[test]
    fn test_index_file_builds_volume_relative_location() {
        let tmp = tempdir().unwrap();
        let mount = tmp.path().canonicalize().unwrap();
        std::fs::create_dir_all(mount.join("a")).unwrap();
        let file = mount.join("a/file1.txt");
        std::fs::write(&file, "hello").unwrap();

        let catalog = MemoryCatalog::new();
        let identities = IdentityTables::default();
        let classifier = FixedClassifier("text/plain".into());
        let ctx = RunContext {
            host: "i-test",
            algorithm: HashAlgorithm::Sha256,
            identities: &identities,
            classifier: &classifier,
            merge: MergeEngine::new(&catalog, RetryPolicy::no_delay(1)),
        };
        let volume = Volume::new("vol-1", &mount);

        let outcome = index_file(&ctx, &volume, &file).unwrap();
        assert_eq!(outcome, MergeOutcome::Created);

        let logged = catalog.locations();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].volume_path, "a/file1.txt");
        assert_eq!(logged[0].volume_path_hash, HashAlgorithm::Sha256.hash(b"a/file1.txt"));
        assert_eq!(
            logged[0].host_path_hash,
            HashAlgorithm::Sha256.hash(file.as_os_str().as_bytes())
        );

        let record = catalog.get_content(&logged[0].content_hash).unwrap().unwrap();
        assert_eq!(record.size, 5);
        assert_eq!(record.mime_type, "text/plain");
    }

    #[test]
    fn test_vanished_file_is_io_error() {
        let tmp = tempdir().unwrap();
        let catalog = MemoryCatalog::new();
        let identities = IdentityTables::default();
        let classifier = FixedClassifier::default();
        let ctx = RunContext {
            host: "i-test",
            algorithm: HashAlgorithm::Md5,
            identities: &identities,
            classifier: &classifier,
            merge: MergeEngine::new(&catalog, RetryPolicy::no_delay(1)),
        };
        let volume = Volume::new("vol-1", tmp.path());
        let err = index_file(&ctx, &volume, &tmp.path().join("gone.txt")).unwrap_err();
        assert!(matches!(err, FileError::Io { .. }));
        assert_eq!(catalog.location_count(), 0);
    }
}
