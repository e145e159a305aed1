use crate::error::FileError;
use crate::merge::MergeOutcome;
use crate::utils::SourceRoot;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A file that was not indexed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Counters shared by the workers of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    files_seen: AtomicUsize,
    created: AtomicUsize,
    appended: AtomicUsize,
    already_indexed: AtomicUsize,
    skipped: Mutex<Vec<FileFailure>>,
    failed: Mutex<Vec<FileFailure>>,
}

impl RunStats {
    /// Counts an entry handed to the pipeline; returns the running total.
    pub fn saw_file(&self) -> usize {
        self.files_seen.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record(&self, outcome: MergeOutcome) {
        let counter = match outcome {
            MergeOutcome::Created => &self.created,
            MergeOutcome::Appended => &self.appended,
            MergeOutcome::AlreadyIndexed => &self.already_indexed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Filesystem problems are skips, store problems are failures.
    pub fn record_error(&self, error: FileError) {
        let failure = FileFailure {
            path: error.path().to_path_buf(),
            reason: error.to_string(),
        };
        let list = match error {
            FileError::Io { .. } => &self.skipped,
            FileError::Store { .. } => &self.failed,
        };
        if let Ok(mut list) = list.lock() {
            list.push(failure);
        }
    }

    pub fn skip(&self, path: PathBuf, reason: impl Into<String>) {
        if let Ok(mut skipped) = self.skipped.lock() {
            skipped.push(FileFailure {
                path,
                reason: reason.into(),
            });
        }
    }

    pub fn into_summary(
        self,
        sources: Vec<SourceRoot>,
        duration: Duration,
        cancelled: bool,
    ) -> RunSummary {
        RunSummary {
            sources,
            files_seen: self.files_seen.into_inner(),
            contents_created: self.created.into_inner(),
            locations_appended: self.appended.into_inner(),
            already_indexed: self.already_indexed.into_inner(),
            skipped: self.skipped.into_inner().unwrap_or_default(),
            failed: self.failed.into_inner().unwrap_or_default(),
            duration,
            cancelled,
        }
    }
}

/// What one run did, surfaced to the operator at the end.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceRoot>,
    pub files_seen: usize,
    pub contents_created: usize,
    pub locations_appended: usize,
    pub already_indexed: usize,
    /// Filesystem errors: unreadable, vanished, permission denied.
    pub skipped: Vec<FileFailure>,
    /// Store errors that outlived their retries.
    pub failed: Vec<FileFailure>,
    pub duration: Duration,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn indexed(&self) -> usize {
        self.contents_created + self.locations_appended + self.already_indexed
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty() && !self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::io;

    #[test]
    fn test_errors_are_split_by_kind() {
        let stats = RunStats::default();
        stats.saw_file();
        stats.saw_file();
        stats.record(MergeOutcome::Created);
        stats.record_error(FileError::io(
            "/data/gone",
            io::Error::new(io::ErrorKind::NotFound, "vanished"),
        ));
        stats.record_error(FileError::Store {
            path: PathBuf::from("/data/x"),
            source: StoreError::Permanent("access denied".into()),
        });

        let summary = stats.into_summary(vec![], Duration::from_secs(1), false);
        assert_eq!(summary.files_seen, 2);
        assert_eq!(summary.indexed(), 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].path, PathBuf::from("/data/gone"));
        assert_eq!(summary.failed.len(), 1);
        assert!(!summary.is_clean());
    }
}
