//! Host identity and volume attachment lookups.
//!
//! The indexer never talks to a cloud metadata service directly; it asks a
//! [`MetadataDirectory`] once per run. [`StaticDirectory`] answers from
//! configuration, [`DeviceDirectory`] joins a configured device -> volume table
//! with the kernel mount table.

use crate::error::Error;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROC_MOUNTS: &str = "/proc/mounts";

pub trait MetadataDirectory: Send + Sync {
    /// Identity of the host being indexed.
    fn instance_id(&self) -> Result<String, Error>;

    /// mount point -> volume id for every attached managed volume.
    fn volume_mounts(&self) -> Result<HashMap<PathBuf, String>, Error>;
}

#[derive(Debug, Clone)]
pub struct StaticDirectory {
    instance_id: String,
    mounts: HashMap<PathBuf, String>,
}

impl StaticDirectory {
    pub fn new(instance_id: impl Into<String>, mounts: Vec<(PathBuf, String)>) -> Self {
        Self {
            instance_id: instance_id.into(),
            mounts: mounts.into_iter().collect(),
        }
    }
}

impl MetadataDirectory for StaticDirectory {
    fn instance_id(&self) -> Result<String, Error> {
        Ok(self.instance_id.clone())
    }

    fn volume_mounts(&self) -> Result<HashMap<PathBuf, String>, Error> {
        Ok(self.mounts.clone())
    }
}

/// Joins device -> volume (block device attachments) with device -> mount
/// point (the mount table).
#[derive(Debug, Clone)]
pub struct DeviceDirectory {
    instance_id: String,
    devices: HashMap<String, String>,
    mounts_file: PathBuf,
}

impl DeviceDirectory {
    pub fn new(instance_id: impl Into<String>, devices: Vec<(String, String)>) -> Self {
        Self {
            instance_id: instance_id.into(),
            devices: devices.into_iter().collect(),
            mounts_file: PathBuf::from(PROC_MOUNTS),
        }
    }

    pub fn with_mounts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_file = path.into();
        self
    }
}

impl MetadataDirectory for DeviceDirectory {
    fn instance_id(&self) -> Result<String, Error> {
        Ok(self.instance_id.clone())
    }

    fn volume_mounts(&self) -> Result<HashMap<PathBuf, String>, Error> {
        let table = fs::read_to_string(&self.mounts_file).map_err(|e| {
            Error::Metadata(format!(
                "reading mount table {}: {}",
                self.mounts_file.display(),
                e
            ))
        })?;
        let device_mounts = parse_mount_table(&table);

        let mut mounts = HashMap::new();
        for (device, volume) in &self.devices {
            match lookup_device(&device_mounts, device) {
                Some(mount_point) => {
                    mounts.insert(mount_point.clone(), volume.clone());
                }
                None => debug!("Device {} ({}) is not mounted", device, volume),
            }
        }
        Ok(mounts)
    }
}

fn lookup_device<'a>(
    device_mounts: &'a HashMap<String, PathBuf>,
    device: &str,
) -> Option<&'a PathBuf> {
    if let Some(mount_point) = device_mounts.get(device) {
        return Some(mount_point);
    }
    // Attachments may name a udev alias of the device the kernel reports.
    let canonical = fs::canonicalize(Path::new(device)).ok()?;
    device_mounts.get(canonical.to_string_lossy().as_ref())
}

/// device -> mount point from mount(5)-style lines. Later lines win, matching
/// the most recent mount of a device.
pub fn parse_mount_table(table: &str) -> HashMap<String, PathBuf> {
    let mut mounts = HashMap::new();
    for line in table.lines() {
        let mut fields = line.split_whitespace();
        if let (Some(device), Some(mount_point)) = (fields.next(), fields.next()) {
            mounts.insert(
                unescape_mount_field(device),
                PathBuf::from(unescape_mount_field(mount_point)),
            );
        }
    }
    mounts
}

/// Undo the kernel's octal escaping of whitespace and backslashes (`\040`).
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(value) = u8::from_str_radix(digits, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
