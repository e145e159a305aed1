use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// An absolute, lexically normalized directory terminated by exactly one `/`.
///
/// The trailing separator makes a plain string prefix test respect path
/// segments: `/data/a/` is a prefix of `/data/a/x/` but not of `/data/ab/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceRoot(String);

impl SourceRoot {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// True when `other` is this root or lies beneath it.
    pub fn covers(&self, other: &SourceRoot) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Same as [`SourceRoot::covers`] for an arbitrary absolute path.
    pub fn contains(&self, path: &Path) -> bool {
        let candidate = normalize_absolute(path);
        self.covers(&candidate)
    }
}

impl fmt::Display for SourceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize `raw` against `cwd`: absolute, single separators, no `.`, `..`
/// resolved lexically (never above `/`), trailing separator.
pub fn normalize_source(raw: impl AsRef<Path>, cwd: &Path) -> SourceRoot {
    let raw = raw.as_ref();
    if raw.is_absolute() {
        normalize_absolute(raw)
    } else {
        normalize_absolute(&cwd.join(raw))
    }
}

fn normalize_absolute(path: &Path) -> SourceRoot {
    let mut segments: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                segments.pop();
            }
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
        }
    }

    let mut normalized = String::from("/");
    for segment in segments {
        normalized.push_str(&segment);
        normalized.push('/');
    }
    SourceRoot(normalized)
}

/// Reduce `dirs` to the minimal covering set of source roots.
///
/// Inputs are normalized, sorted shortest first, and a candidate is kept only
/// when no kept root covers it. Every input ends up covered by exactly one
/// returned root.
pub fn fold_sources<S: AsRef<Path>>(dirs: &[S], cwd: &Path) -> Vec<SourceRoot> {
    fold_roots(dirs.iter().map(|d| normalize_source(d, cwd)).collect())
}

/// Fold already normalized roots.
pub fn fold_roots(mut roots: Vec<SourceRoot>) -> Vec<SourceRoot> {
    roots.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
    roots.dedup();

    let mut folded: Vec<SourceRoot> = Vec::new();
    for root in roots {
        if !folded.iter().any(|kept| kept.covers(&root)) {
            folded.push(root);
        }
    }
    folded
}

/// Path of `path` relative to `mount_point`, without a leading separator.
/// `None` when `path` is not under `mount_point`.
pub fn relative_to(path: &Path, mount_point: &Path) -> Option<PathBuf> {
    path.strip_prefix(mount_point).ok().map(Path::to_path_buf)
}
