//! Path resolution and open-file introspection.
//!
//! Renames are detected by asking the OS which name currently backs an open
//! handle; device/inode identity tells whether a path still names that handle.

use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;

/// Normalizes `path` to an absolute path without touching the filesystem
/// beyond reading the working directory.
///
/// `.` and `..` components are folded lexically; symlinks are left alone.
pub(crate) fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    Ok(resolved)
}

/// Recovers the path currently backing `file`, which was last known as
/// `old_path`.
///
/// Reads the process's file-descriptor table and returns `None` when the file
/// has no name left. Without the table, see [`locate_renamed`].
#[cfg(target_os = "linux")]
pub(crate) async fn current_path_of(
    file: &File,
    old_path: &Path,
    hint: Option<&Path>,
) -> Option<PathBuf> {
    use std::os::fd::AsRawFd;

    let link = Path::new("/proc/self/fd").join(file.as_raw_fd().to_string());
    match tokio::fs::read_link(&link).await {
        Ok(target) => live_target(target),
        Err(_) => locate_renamed(file, old_path, hint).await,
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) async fn current_path_of(
    file: &File,
    old_path: &Path,
    hint: Option<&Path>,
) -> Option<PathBuf> {
    locate_renamed(file, old_path, hint).await
}

/// Uses the watcher's rename destination when there is one, otherwise looks
/// for the open file among the entries of its old directory.
async fn locate_renamed(file: &File, old_path: &Path, hint: Option<&Path>) -> Option<PathBuf> {
    if let Some(hint) = hint {
        return Some(hint.to_path_buf());
    }
    let identity = FileIdentity::of(&file.metadata().await.ok()?)?;
    find_by_identity(parent_dir(old_path), identity).await
}

/// Returns the regular file in `dir` with the given identity.
async fn find_by_identity(dir: &Path, identity: FileIdentity) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if metadata.is_file() && FileIdentity::of(&metadata) == Some(identity) {
            return Some(entry.path());
        }
    }
    None
}

/// Procfs marks unlinked targets with a " (deleted)" suffix.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn live_target(target: PathBuf) -> Option<PathBuf> {
    match target.to_str() {
        Some(s) if s.ends_with(" (deleted)") => None,
        _ => Some(target),
    }
}

/// Device and inode pair that survives renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub(crate) fn of(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn of(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Returns true when `path` still names the same file as the open `file`.
pub(crate) async fn still_names(path: &Path, file: &File) -> bool {
    let (Ok(at_path), Ok(open)) = (tokio::fs::metadata(path).await, file.metadata().await) else {
        return false;
    };
    match (FileIdentity::of(&at_path), FileIdentity::of(&open)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Returns the directory that holds `path`, for directory-level watches.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
