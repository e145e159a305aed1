pub mod directory;

use crate::error::Error;
use crate::model::UNKNOWN_VOLUME;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use directory::{DeviceDirectory, MetadataDirectory, StaticDirectory};

/// Storage volume backing a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub id: String,
    pub mount_point: PathBuf,
}

impl Volume {
    pub fn new(id: impl Into<String>, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            mount_point: mount_point.into(),
        }
    }
}

/// mount point -> volume id, fetched once per run.
#[derive(Debug, Clone, Default)]
pub struct VolumeMapping {
    mounts: HashMap<PathBuf, String>,
}

impl VolumeMapping {
    pub fn new(mounts: HashMap<PathBuf, String>) -> Self {
        Self { mounts }
    }

    /// The run's single metadata lookup.
    pub fn load(directory: &dyn MetadataDirectory) -> Result<Self, Error> {
        let mounts = directory.volume_mounts()?;
        info!("Resolved {} mounted volume(s)", mounts.len());
        for (mount_point, volume) in &mounts {
            debug!("  {} -> {}", mount_point.display(), volume);
        }
        Ok(Self { mounts })
    }

    pub fn get(&self, mount_point: &Path) -> Option<&str> {
        self.mounts.get(mount_point).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

/// Decides whether a directory is a mount boundary.
pub trait MountProbe: Send + Sync {
    fn is_mount_point(&self, path: &Path) -> bool;
}

/// A directory is a mount point when it sits on a different device than its
/// parent, or is its own parent.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsMountProbe;

impl MountProbe for OsMountProbe {
    fn is_mount_point(&self, path: &Path) -> bool {
        let parent = match path.parent() {
            Some(parent) => parent,
            None => return true,
        };
        match (fs::metadata(path), fs::metadata(parent)) {
            (Ok(here), Ok(up)) => here.dev() != up.dev() || here.ino() == up.ino(),
            _ => false,
        }
    }
}

/// Explicit set of mount points. `/` always counts.
#[derive(Debug, Default, Clone)]
pub struct FixedMountProbe {
    mount_points: HashSet<PathBuf>,
}

impl FixedMountProbe {
    pub fn new<I, P>(mount_points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            mount_points: mount_points.into_iter().map(Into::into).collect(),
        }
    }
}

impl MountProbe for FixedMountProbe {
    fn is_mount_point(&self, path: &Path) -> bool {
        path.parent().is_none() || self.mount_points.contains(path)
    }
}

/// Maps paths to the volume behind them. Immutable once built, so it is shared
/// across workers by reference.
pub struct VolumeResolver {
    mapping: VolumeMapping,
    probe: Arc<dyn MountProbe>,
}

impl VolumeResolver {
    pub fn with_probe(mapping: VolumeMapping, probe: Arc<dyn MountProbe>) -> Self {
        Self { mapping, probe }
    }

    /// Nearest ancestor of `path` (inclusive) that is a mount boundary.
    pub fn mount_point(&self, path: &Path) -> PathBuf {
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut current = resolved.as_path();
        loop {
            if self.probe.is_mount_point(current) {
                return current.to_path_buf();
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return current.to_path_buf(),
            }
        }
    }

    /// Volume for `path`; unmapped mount points resolve to `UNKNOWN-VOLUME`.
    pub fn resolve(&self, path: &Path) -> Volume {
        let mount_point = self.mount_point(path);
        match self.mapping.get(&mount_point) {
            Some(id) => Volume::new(id, mount_point),
            None => {
                warn!(
                    "No volume known for mount point {} (from {}), using {}",
                    mount_point.display(),
                    path.display(),
                    UNKNOWN_VOLUME
                );
                Volume::new(UNKNOWN_VOLUME, mount_point)
            }
        }
    }
}
