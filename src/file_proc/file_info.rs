use crate::model::{AccessMode, LocationRecord, Principal, Timestamp, Timestamps};
use crate::volume::Volume;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use std::ffi::CStr;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::{mem, ptr};
use tracing::debug;

/// uid -> user name and gid -> group name, memoized for one run.
///
/// Names come from the system user database through NSS, so directory-backed
/// accounts (LDAP, sssd) resolve like local ones. Ids nobody knows render as
/// their number.
#[derive(Debug, Default, Clone)]
pub struct IdentityTables {
    users: DashMap<u32, String>,
    groups: DashMap<u32, String>,
    system_lookup: bool,
}

impl IdentityTables {
    pub fn load() -> Self {
        Self {
            system_lookup: true,
            ..Self::default()
        }
    }

    /// Fixed tables that never consult the system database.
    pub fn from_entries(users: &[(u32, &str)], groups: &[(u32, &str)]) -> Self {
        Self {
            users: users.iter().map(|(id, n)| (*id, n.to_string())).collect(),
            groups: groups.iter().map(|(id, n)| (*id, n.to_string())).collect(),
            system_lookup: false,
        }
    }

    pub fn user(&self, uid: u32) -> Principal {
        let name = self.resolve(&self.users, uid, user_name);
        Principal { id: uid, name }
    }

    pub fn group(&self, gid: u32) -> Principal {
        let name = self.resolve(&self.groups, gid, group_name);
        Principal { id: gid, name }
    }

    fn resolve(
        &self,
        table: &DashMap<u32, String>,
        id: u32,
        lookup: fn(u32) -> Option<String>,
    ) -> String {
        if let Some(name) = table.get(&id) {
            return name.clone();
        }
        let system = if self.system_lookup { lookup(id) } else { None };
        let name = system.unwrap_or_else(|| {
            debug!("No name for id {}, using the number", id);
            id.to_string()
        });
        table.entry(id).or_insert(name).clone()
    }
}

const LOOKUP_BUFFER_LENGTH: usize = 2048;

/// Calls a reentrant `get*_r` function, growing the buffer on `ERANGE`.
/// Returns `None` when the entry does not exist or the lookup failed.
fn lookup_entry<T>(
    mut call: impl FnMut(&mut T, &mut [libc::c_char], &mut *mut T) -> libc::c_int,
    name_of: impl Fn(&T) -> *const libc::c_char,
) -> Option<String> {
    let mut buf: Vec<libc::c_char> = vec![0; LOOKUP_BUFFER_LENGTH];
    // SAFETY: passwd and group are plain C structs; all-zero is a valid value.
    let mut entry = unsafe { mem::zeroed::<T>() };
    let mut result = ptr::null_mut::<T>();

    loop {
        let r = call(&mut entry, &mut buf[..], &mut result);
        if r != libc::ERANGE {
            break;
        }
        let new_len = buf.len().checked_mul(2)?;
        buf.resize(new_len, 0);
    }

    if result.is_null() {
        return None;
    }
    let name = name_of(&entry);
    if name.is_null() {
        return None;
    }
    // SAFETY: on success the name points into `buf`, which is still alive.
    let name = unsafe { CStr::from_ptr(name) };
    Some(name.to_string_lossy().into_owned())
}

fn user_name(uid: u32) -> Option<String> {
    lookup_entry::<libc::passwd>(
        |entry, buf, result| unsafe {
            libc::getpwuid_r(uid, entry, buf.as_mut_ptr(), buf.len(), result)
        },
        |entry| entry.pw_name as *const libc::c_char,
    )
}

fn group_name(gid: u32) -> Option<String> {
    lookup_entry::<libc::group>(
        |entry, buf, result| unsafe {
            libc::getgrgid_r(gid, entry, buf.as_mut_ptr(), buf.len(), result)
        },
        |entry| entry.gr_name as *const libc::c_char,
    )
}

/// Seconds and nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochTime {
    pub secs: i64,
    pub nanos: u32,
}

impl EpochTime {
    pub fn new(secs: i64, nanos: i64) -> Self {
        Self {
            secs,
            nanos: nanos.clamp(0, 999_999_999) as u32,
        }
    }
}

/// Stat facts for one file, captured before the record is assembled.
#[derive(Debug, Clone)]
pub struct FileFacts {
    pub path: PathBuf,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub accessed: EpochTime,
    pub modified: EpochTime,
    pub changed: EpochTime,
}

impl FileFacts {
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: metadata.mode(),
            accessed: EpochTime::new(metadata.atime(), metadata.atime_nsec()),
            modified: EpochTime::new(metadata.mtime(), metadata.mtime_nsec()),
            changed: EpochTime::new(metadata.ctime(), metadata.ctime_nsec()),
        }
    }
}

/// The three digests a location carries.
#[derive(Debug, Clone)]
pub struct LocationDigests {
    pub host_path_hash: String,
    pub volume_path_hash: String,
    pub content_hash: String,
}

/// Everything needed to assemble a [`LocationRecord`]; building is pure.
pub struct LocationRecordBuilder<'a> {
    pub host: &'a str,
    pub volume: &'a Volume,
    pub identities: &'a IdentityTables,
}

impl<'a> LocationRecordBuilder<'a> {
    pub fn build(
        &self,
        facts: &FileFacts,
        volume_path: &str,
        digests: LocationDigests,
    ) -> LocationRecord {
        LocationRecord {
            volume: self.volume.id.clone(),
            volume_path: volume_path.to_string(),
            volume_path_hash: digests.volume_path_hash,
            host: self.host.to_string(),
            host_path: facts.path.to_string_lossy().into_owned(),
            host_path_hash: digests.host_path_hash,
            content_hash: digests.content_hash,
            owner: self.identities.user(facts.uid),
            group: self.identities.group(facts.gid),
            access_mode: access_mode(facts.mode),
            timestamps: Timestamps {
                access: timestamp(facts.accessed),
                modify: timestamp(facts.modified),
                change: timestamp(facts.changed),
            },
        }
    }
}

pub fn access_mode(mode: u32) -> AccessMode {
    AccessMode {
        numeric: format!("{:04o}", mode & 0o7777),
        symbolic: symbolic_mode(mode),
    }
}

/// `rwxrwxrwx` rendering; setuid, setgid and sticky show as `s/S`, `s/S`, `t/T`.
pub fn symbolic_mode(mode: u32) -> String {
    let special = [(0o4000u32, 's', 'S'), (0o2000, 's', 'S'), (0o1000, 't', 'T')];
    let mut out = String::with_capacity(9);
    for (class, (special_bit, set_exec, set_no_exec)) in special.iter().enumerate() {
        let bits = (mode >> (6 - class * 3)) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        let exec = bits & 0o1 != 0;
        out.push(match (mode & special_bit != 0, exec) {
            (true, true) => *set_exec,
            (true, false) => *set_no_exec,
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}

pub fn timestamp(time: EpochTime) -> Timestamp {
    let iso8601 = DateTime::<Utc>::from_timestamp(time.secs, time.nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        .unwrap_or_default();
    Timestamp {
        epoch: time.secs as f64 + f64::from(time.nanos) / 1_000_000_000.0,
        iso8601,
    }
}
