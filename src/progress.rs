use crate::file_proc::stats::RunSummary;
use crate::utils::SourceRoot;
use crate::volume::Volume;
use std::path::Path;

/// Trait for reporting indexing progress.
///
/// Called from worker threads; all methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, _sources: &[SourceRoot]) {}
    fn on_source_start(&self, _source: &SourceRoot, _volume: &Volume) {}
    fn on_file_indexed(&self, _files_seen: usize, _path: &Path) {}
    fn on_source_complete(&self, _source: &SourceRoot) {}
    fn on_run_complete(&self, _summary: &RunSummary) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
