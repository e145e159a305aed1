use crate::config::AppConfig;
use crate::error::Error;
use crate::file_proc::file_info::IdentityTables;
use crate::file_proc::hash::HashAlgorithm;
use crate::file_proc::mime::{MagicClassifier, MimeClassifier};
use crate::file_proc::stats::{RunStats, RunSummary};
use crate::file_proc::{self, scan, RunContext};
use crate::merge::MergeEngine;
use crate::model::UNKNOWN_VOLUME;
use crate::progress::ProgressReporter;
use crate::store::Catalog;
use crate::utils::{fold_roots, fold_sources, normalize_source, SourceRoot};
use crate::volume::{MetadataDirectory, MountProbe, OsMountProbe, VolumeMapping, VolumeResolver};
use rayon::prelude::*;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives one indexing run: fold sources, resolve volumes, walk, hash and
/// merge every file into the catalog.
pub struct IndexEngine {
    config: AppConfig,
    algorithm: HashAlgorithm,
    catalog: Arc<dyn Catalog>,
    directory: Box<dyn MetadataDirectory>,
    probe: Arc<dyn MountProbe>,
    classifier: Arc<dyn MimeClassifier>,
    identities: Option<IdentityTables>,
    cancel: Arc<AtomicBool>,
}

struct Cancelled;

impl IndexEngine {
    /// Fails when the configured hash algorithm is unknown.
    pub fn new(config: AppConfig, catalog: Arc<dyn Catalog>) -> Result<Self, Error> {
        let algorithm = config.algorithm()?;
        let directory = config.metadata_directory();
        Ok(Self {
            config,
            algorithm,
            catalog,
            directory,
            probe: Arc::new(OsMountProbe),
            classifier: Arc::new(MagicClassifier),
            identities: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_directory(mut self, directory: Box<dyn MetadataDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_mount_probe(mut self, probe: Arc<dyn MountProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn MimeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_identities(mut self, identities: IdentityTables) -> Self {
        self.identities = Some(identities);
        self
    }

    /// Setting the flag stops the run between files.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<RunSummary, Error> {
        let run_start = Instant::now();
        let stats = RunStats::default();

        let cwd = env::current_dir()?;
        let folded = fold_sources(&self.config.source_dirs, &cwd);
        info!("Processing sources: {:?}", folded);
        let sources = canonical_sources(folded, &stats);
        if sources.is_empty() {
            info!("No source directories to index");
            return Ok(stats.into_summary(sources, run_start.elapsed(), false));
        }

        // A failed metadata lookup degrades to unknown volumes, never a failed run.
        let host = self.directory.instance_id().unwrap_or_else(|e| {
            warn!(
                "Host identity unavailable ({}), using {}",
                e, self.config.instance_id
            );
            self.config.instance_id.clone()
        });
        let mapping = VolumeMapping::load(self.directory.as_ref()).unwrap_or_else(|e| {
            warn!("Volume lookup failed: {}", e);
            VolumeMapping::default()
        });
        if mapping.is_empty() {
            warn!("No volume mappings known, every source maps to {}", UNKNOWN_VOLUME);
        }
        let resolver = VolumeResolver::with_probe(mapping, Arc::clone(&self.probe));
        let identities = match &self.identities {
            Some(identities) => identities.clone(),
            None => IdentityTables::load(),
        };

        let workers = self.config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("hashfs-worker-{}", i))
            .build()?;
        debug!(
            "Host {}, {} worker(s), hashing with {}",
            host, workers, self.algorithm
        );

        let ctx = RunContext {
            host: &host,
            algorithm: self.algorithm,
            identities: &identities,
            classifier: self.classifier.as_ref(),
            merge: MergeEngine::new(self.catalog.as_ref(), self.config.retry),
        };

        reporter.on_run_start(&sources);
        let mut cancelled = false;
        for source in &sources {
            if self.cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let volume = resolver.resolve(source.as_path());
            info!(
                "Indexing {} on volume {} (mounted at {})",
                source,
                volume.id,
                volume.mount_point.display()
            );
            reporter.on_source_start(source, &volume);

            let walked = pool.install(|| {
                scan::walk_files(source.as_path())
                    .par_bridge()
                    .try_for_each(|item| {
                        if self.cancel.load(Ordering::Relaxed) {
                            return Err(Cancelled);
                        }
                        match item {
                            Ok(path) => {
                                let seen = stats.saw_file();
                                match file_proc::index_file(&ctx, &volume, &path) {
                                    Ok(outcome) => stats.record(outcome),
                                    Err(e) => {
                                        warn!("Skipping file: {}", e);
                                        stats.record_error(e);
                                    }
                                }
                                reporter.on_file_indexed(seen, &path);
                            }
                            Err(scan_error) => {
                                warn!(
                                    "Skipping {}: {}",
                                    scan_error.path.display(),
                                    scan_error.error
                                );
                                stats.skip(scan_error.path, scan_error.error.to_string());
                            }
                        }
                        Ok(())
                    })
            });

            reporter.on_source_complete(source);
            if walked.is_err() {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            warn!("Run cancelled, remaining files were not indexed");
        }
        let summary = stats.into_summary(sources, run_start.elapsed(), cancelled);
        info!(
            "Indexed {} of {} files in {:.2}s: {} new contents, {} new locations, {} already indexed",
            summary.indexed(),
            summary.files_seen,
            summary.duration.as_secs_f64(),
            summary.contents_created,
            summary.locations_appended,
            summary.already_indexed,
        );
        reporter.on_run_complete(&summary);
        Ok(summary)
    }
}

/// Resolve symlinks in each folded root and fold again, since two lexically
/// distinct roots can name the same directory. Missing roots are skipped.
fn canonical_sources(folded: Vec<SourceRoot>, stats: &RunStats) -> Vec<SourceRoot> {
    let mut canonical = Vec::with_capacity(folded.len());
    for root in folded {
        match fs::canonicalize(root.as_path()) {
            Ok(path) if path.is_dir() => canonical.push(normalize_source(&path, Path::new("/"))),
            Ok(path) => {
                warn!("Source {} is not a directory", path.display());
                stats.skip(path, "not a directory");
            }
            Err(e) => {
                warn!("Source {} is not accessible: {}", root, e);
                stats.skip(root.as_path().to_path_buf(), e.to_string());
            }
        }
    }
    fold_roots(canonical)
}
