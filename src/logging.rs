use std::env;
use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/hashfs.log";

/// `HASHFS_LOG` takes an `EnvFilter` directive; `TRACING_LEVEL` is the fallback.
fn filter_from_env() -> EnvFilter {
    let directive = env::var("HASHFS_LOG")
        .or_else(|_| env::var("TRACING_LEVEL"))
        .unwrap_or_else(|_| "hashfs=info".to_string());
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a compact stderr layer and, unless `LOG_FILE_PATH` is set empty, a
/// non-blocking file layer. Keep the returned guard alive until exit so the
/// file writer flushes.
pub fn init_logger() -> Option<WorkerGuard> {
    let log_file_path = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

    let stderr_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = if log_file_path.is_empty() {
        (None, None)
    } else {
        let path = Path::new(&log_file_path);
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hashfs.log".to_string());
        let (non_blocking, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_thread_names(true)
            .with_ansi(false);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter_from_env())
        .init();

    debug!(
        "Logging to stderr{}",
        if guard.is_some() {
            format!(" and {}", log_file_path)
        } else {
            String::new()
        }
    );

    guard
}
