use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A directory entry the walk could not visit.
#[derive(Debug)]
pub struct ScanError {
    pub path: PathBuf,
    pub error: io::Error,
}

/// Lazy walk over the regular files under `root`.
///
/// Symlinks are never followed and are skipped. Unreadable directories and
/// entries that disappear mid-walk come out as `Err` items; the walk carries on
/// past them. Order is unspecified.
pub fn walk_files(root: &Path) -> impl Iterator<Item = Result<PathBuf, ScanError>> {
    let root_path = root.to_path_buf();
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                if file_type.is_file() {
                    Some(Ok(entry.into_path()))
                } else {
                    if file_type.is_symlink() {
                        debug!("Skipping symlink {}", entry.path().display());
                    }
                    None
                }
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root_path.clone());
                let error = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                Some(Err(ScanError { path, error }))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_walk_visits_every_file_once() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("a/deep/er")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("top.txt"), "top").unwrap();
        fs::write(root.join("a/one.txt"), "one").unwrap();
        fs::write(root.join("a/deep/er/two.bin"), [0u8, 1, 2]).unwrap();
        fs::write(root.join("b/empty"), "").unwrap();

        let files: Vec<PathBuf> = walk_files(root).map(|r| r.unwrap()).collect();
        let unique: HashSet<&PathBuf> = files.iter().collect();
        assert_eq!(files.len(), 4);
        assert_eq!(unique.len(), 4);
        assert!(unique.contains(&root.join("a/deep/er/two.bin")));
        assert!(unique.contains(&root.join("b/empty")));
    }

    #[test]
    fn test_walk_skips_symlinks() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();

        let files: Vec<PathBuf> = walk_files(root).map(|r| r.unwrap()).collect();
        assert_eq!(files, vec![root.join("real.txt")]);
    }

    #[test]
    fn test_missing_root_reports_error() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("gone");
        let items: Vec<_> = walk_files(&missing).collect();
        assert_eq!(items.len(), 1);
        let err = items.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.path, missing);
        assert_eq!(err.error.kind(), io::ErrorKind::NotFound);
    }
}
