use hashfs::file_proc::stats::RunSummary;
use hashfs::utils::SourceRoot;
use hashfs::volume::Volume;
use hashfs::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const REDRAW_EVERY: usize = 64;

/// CLI progress reporter: one spinner per source directory, since the number
/// of files is not known ahead of the walk.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_source_start(&self, source: &SourceRoot, volume: &Volume) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}") {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        pb.set_message(format!("Indexing {} ({})", source, volume.id));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_file_indexed(&self, files_seen: usize, path: &Path) {
        if files_seen % REDRAW_EVERY != 0 {
            return;
        }
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(format!("{} files... {}", files_seen, path.display()));
            }
        }
    }

    fn on_source_complete(&self, source: &SourceRoot) {
        self.finish_bar();
        eprintln!("  \x1b[32m✓\x1b[0m {}", source);
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Indexed {} files in {:.2}s",
            summary.indexed(),
            summary.duration.as_secs_f64()
        );
    }
}
