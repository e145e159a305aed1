//! Reconciles observed locations with the shared catalog.
//!
//! Per file: the location is appended to the log, the content record is read,
//! then either created (first observation) or grown by one path hash through
//! the store's append-if-missing primitive. Every step is idempotent per
//! `(content hash, volume, path hash)`, so any interleaving of workers or hosts
//! converges to the same catalog.

use crate::error::StoreError;
use crate::model::{ContentFacts, ContentRecord, LocationRecord};
use crate::store::{AppendOutcome, Catalog, CreateOutcome, RetryPolicy};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First observation of this content.
    Created,
    /// Known content, new location reference.
    Appended,
    /// Location already referenced; nothing changed besides the log.
    AlreadyIndexed,
}

pub struct MergeEngine<'a> {
    catalog: &'a dyn Catalog,
    retry: RetryPolicy,
}

impl<'a> MergeEngine<'a> {
    pub fn new(catalog: &'a dyn Catalog, retry: RetryPolicy) -> Self {
        Self { catalog, retry }
    }

    pub fn merge(
        &self,
        location: &LocationRecord,
        facts: &ContentFacts,
    ) -> Result<MergeOutcome, StoreError> {
        let content_hash = location.content_hash.as_str();
        let volume = location.volume.as_str();
        let path_hash = location.volume_path_hash.as_str();

        self.retry
            .run("record location", || self.catalog.record_location(location))?;

        let existing = self
            .retry
            .run("read content", || self.catalog.get_content(content_hash))?;

        match existing {
            None => {
                let record = ContentRecord::first_seen(
                    content_hash,
                    &facts.mime_type,
                    facts.size,
                    volume,
                    path_hash,
                );
                let created = self
                    .retry
                    .run("create content", || self.catalog.create_content(&record))?;
                if created == CreateOutcome::Created {
                    trace!("Created {} at {}:{}", content_hash, volume, path_hash);
                    return Ok(MergeOutcome::Created);
                }
                debug!("{} was created concurrently, appending instead", content_hash);
            }
            Some(record) if record.has_location(volume, path_hash) => {
                trace!("{} already indexed at {}:{}", content_hash, volume, path_hash);
                return Ok(MergeOutcome::AlreadyIndexed);
            }
            Some(_) => {}
        }

        let appended = self.retry.run("append location", || {
            self.catalog
                .append_location_ref(content_hash, volume, path_hash)
        })?;
        Ok(match appended {
            AppendOutcome::Appended => MergeOutcome::Appended,
            AppendOutcome::AlreadyPresent => MergeOutcome::AlreadyIndexed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessMode, Principal, Timestamp, Timestamps};
    use crate::store::MemoryCatalog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn location(content: &str, volume: &str, path_hash: &str) -> LocationRecord {
        let ts = Timestamp {
            epoch: 0.0,
            iso8601: "1970-01-01T00:00:00+00:00".into(),
        };
        LocationRecord {
            volume: volume.into(),
            volume_path: "a/file".into(),
            volume_path_hash: path_hash.into(),
            host: "i-test".into(),
            host_path: "/data/a/file".into(),
            host_path_hash: "sha256:host".into(),
            content_hash: content.into(),
            owner: Principal { id: 0, name: "root".into() },
            group: Principal { id: 0, name: "root".into() },
            access_mode: AccessMode {
                numeric: "0644".into(),
                symbolic: "rw-r--r--".into(),
            },
            timestamps: Timestamps {
                access: ts.clone(),
                modify: ts.clone(),
                change: ts,
            },
        }
    }

    fn facts() -> ContentFacts {
        ContentFacts {
            mime_type: "text/plain".into(),
            size: 5,
        }
    }

    #[test]
    fn test_first_then_new_then_repeat() {
        let catalog = MemoryCatalog::new();
        let engine = MergeEngine::new(&catalog, RetryPolicy::no_delay(1));

        let first = engine.merge(&location("sha256:c", "vol-1", "sha256:a"), &facts()).unwrap();
        let second = engine.merge(&location("sha256:c", "vol-1", "sha256:b"), &facts()).unwrap();
        let other_volume = engine.merge(&location("sha256:c", "vol-2", "sha256:a"), &facts()).unwrap();
        let repeat = engine.merge(&location("sha256:c", "vol-1", "sha256:a"), &facts()).unwrap();

        assert_eq!(first, MergeOutcome::Created);
        assert_eq!(second, MergeOutcome::Appended);
        assert_eq!(other_volume, MergeOutcome::Appended);
        assert_eq!(repeat, MergeOutcome::AlreadyIndexed);

        let record = catalog.get_content("sha256:c").unwrap().unwrap();
        assert_eq!(record.locations["vol-1"], vec!["sha256:a", "sha256:b"]);
        assert_eq!(record.locations["vol-2"], vec!["sha256:a"]);
        assert_eq!(catalog.location_count(), 4);
    }

    #[test]
    fn test_concurrent_workers_converge() {
        let catalog = MemoryCatalog::new();
        let observations: Vec<LocationRecord> = (0..40)
            .map(|i| {
                location(
                    &format!("sha256:c{}", i % 5),
                    &format!("vol-{}", i % 2),
                    &format!("sha256:p{}", i % 8),
                )
            })
            .collect();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let engine = MergeEngine::new(&catalog, RetryPolicy::no_delay(1));
                    for observation in &observations {
                        engine.merge(observation, &facts()).unwrap();
                    }
                });
            }
        });

        let sequential = MemoryCatalog::new();
        let engine = MergeEngine::new(&sequential, RetryPolicy::no_delay(1));
        for observation in &observations {
            engine.merge(observation, &facts()).unwrap();
        }

        let normalize = |records: Vec<ContentRecord>| {
            records
                .into_iter()
                .map(|mut r| {
                    r.locations.values_mut().for_each(|v| v.sort());
                    r
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(normalize(catalog.contents()), normalize(sequential.contents()));
        assert_eq!(catalog.location_count(), 8 * observations.len());
    }

    /// Fails the first `failures` calls of every operation with a transient error.
    struct FlakyCatalog {
        inner: MemoryCatalog,
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyCatalog {
        fn trip(&self) -> Result<(), StoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % (self.failures + 1) < self.failures {
                Err(StoreError::Transient("throttled".into()))
            } else {
                Ok(())
            }
        }
    }

    impl Catalog for FlakyCatalog {
        fn record_location(&self, location: &LocationRecord) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.record_location(location)
        }
        fn get_content(&self, content_hash: &str) -> Result<Option<ContentRecord>, StoreError> {
            self.trip()?;
            self.inner.get_content(content_hash)
        }
        fn create_content(&self, record: &ContentRecord) -> Result<CreateOutcome, StoreError> {
            self.trip()?;
            self.inner.create_content(record)
        }
        fn append_location_ref(
            &self,
            content_hash: &str,
            volume: &str,
            path_hash: &str,
        ) -> Result<AppendOutcome, StoreError> {
            self.trip()?;
            self.inner.append_location_ref(content_hash, volume, path_hash)
        }
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let catalog = FlakyCatalog {
            inner: MemoryCatalog::new(),
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let engine = MergeEngine::new(&catalog, RetryPolicy::no_delay(3));
        let outcome = engine.merge(&location("sha256:c", "vol-1", "sha256:a"), &facts()).unwrap();
        assert_eq!(outcome, MergeOutcome::Created);
        assert_eq!(catalog.inner.content_count(), 1);
        assert_eq!(catalog.inner.location_count(), 1);
    }

    #[test]
    fn test_exhausted_retries_surface_error() {
        let catalog = FlakyCatalog {
            inner: MemoryCatalog::new(),
            failures: 5,
            calls: AtomicUsize::new(0),
        };
        let engine = MergeEngine::new(&catalog, RetryPolicy::no_delay(2));
        let err = engine
            .merge(&location("sha256:c", "vol-1", "sha256:a"), &facts())
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(catalog.inner.content_count(), 0);
    }
}
