// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{Result, WatchError};

pub mod mock;

/// Abstract filesystem interface.
///
/// Methods return `io::Result` so callers can tell "not found" apart from
/// every other failure; the watchers map the two cases to different
/// lifecycle outcomes.
pub trait FileSystem: Send + Sync + Debug {
    /// Whether a file exists at `path`, following links.
    ///
    /// `Ok(false)` means confirmed absence; any other stat failure is
    /// returned as the error it was.
    fn path_exists(&self, path: &Path) -> io::Result<bool>;

    /// Whether a directory entry exists at `path`, without following links.
    fn entry_exists(&self, path: &Path) -> io::Result<bool>;

    /// Size in bytes of the file at `path`, following links.
    fn file_size(&self, path: &Path) -> io::Result<i64>;

    /// Target a symbolic link points at, as stored (possibly relative).
    fn resolve_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Canonical absolute form of an existing path.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn path_exists(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn entry_exists(&self, path: &Path) -> io::Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn file_size(&self, path: &Path) -> io::Result<i64> {
        let meta = fs::metadata(path)?;
        Ok(i64::try_from(meta.len()).unwrap_or(i64::MAX))
    }

    fn resolve_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }
}

/// Split a watch target into its canonicalized containing directory and the
/// absolute form of the target itself.
///
/// Only the parent is canonicalized; the file itself may not exist yet, and
/// a link target must keep its own name rather than resolve through it.
pub(crate) fn canonical_watch_pair(fs: &dyn FileSystem, path: &Path) -> Result<(PathBuf, PathBuf)> {
    let Some(name) = path.file_name() else {
        return Err(WatchError::InvalidWatchPath(path.to_path_buf()));
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let dir = fs.canonicalize(parent)?;
    let target = dir.join(name);
    Ok((dir, target))
}
