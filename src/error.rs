use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unknown hash algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("Catalog error: {0}")]
    Store(#[from] StoreError),

    #[error("Metadata lookup failed: {0}")]
    Metadata(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Failure reported by a catalog backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Throttling, timeouts, lock contention. Safe to retry.
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("store error: {0}")]
    Permanent(String),

    #[error("corrupt value under key '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: bincode::Error,
    },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;
        match err.kind() {
            ErrorKind::Busy
            | ErrorKind::TimedOut
            | ErrorKind::TryAgain
            | ErrorKind::Incomplete
            | ErrorKind::ShutdownInProgress => StoreError::Transient(err.into_string()),
            _ => StoreError::Permanent(err.into_string()),
        }
    }
}

/// Why a single file did not make it into the catalog.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

impl FileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FileError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            FileError::Io { path, .. } | FileError::Store { path, .. } => path,
        }
    }
}
