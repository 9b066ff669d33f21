// src/fs/mock.rs

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::FileSystem;

#[derive(Debug, Clone)]
pub enum MockNode {
    File { size: i64 },
    Link { target: PathBuf },
    Broken { kind: io::ErrorKind },
}

/// In-memory [`FileSystem`] for tests.
///
/// Holds a flat map of paths to nodes behind shared state, so a clone handed
/// to the code under test observes later mutations made by the test.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    nodes: Arc<Mutex<HashMap<PathBuf, MockNode>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a regular file of the given size.
    pub fn add_file(&self, path: impl AsRef<Path>, size: i64) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(path.as_ref().to_path_buf(), MockNode::File { size });
    }

    /// Insert or repoint a symbolic link.
    pub fn add_link(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(
            path.as_ref().to_path_buf(),
            MockNode::Link {
                target: target.as_ref().to_path_buf(),
            },
        );
    }

    /// Insert an entry whose stat fails with the given error kind.
    pub fn add_broken(&self, path: impl AsRef<Path>, kind: io::ErrorKind) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(path.as_ref().to_path_buf(), MockNode::Broken { kind });
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.remove(path.as_ref());
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("no mock entry: {path:?}"))
    }

    /// Resolve `path` to a file size the way stat would, following links.
    ///
    /// A link chain longer than the hop limit errors with a non-NotFound
    /// kind; callers must not read a loop as absence.
    fn follow(&self, nodes: &HashMap<PathBuf, MockNode>, path: &Path) -> io::Result<i64> {
        let mut current = path.to_path_buf();
        for _ in 0..8 {
            match nodes.get(&current) {
                Some(MockNode::File { size }) => return Ok(*size),
                Some(MockNode::Link { target }) => current = target.clone(),
                Some(MockNode::Broken { kind }) => {
                    return Err(io::Error::new(*kind, format!("broken mock entry: {current:?}")));
                }
                None => return Err(Self::not_found(&current)),
            }
        }
        Err(io::Error::other(format!("link loop at {path:?}")))
    }
}

impl FileSystem for MockFileSystem {
    fn path_exists(&self, path: &Path) -> io::Result<bool> {
        let nodes = self.nodes.lock().unwrap();
        match self.follow(&nodes, path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn entry_exists(&self, path: &Path) -> io::Result<bool> {
        let nodes = self.nodes.lock().unwrap();
        Ok(nodes.contains_key(path))
    }

    fn file_size(&self, path: &Path) -> io::Result<i64> {
        let nodes = self.nodes.lock().unwrap();
        self.follow(&nodes, path)
    }

    fn resolve_link(&self, path: &Path) -> io::Result<PathBuf> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(MockNode::Link { target }) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a link: {path:?}"),
            )),
            None => Err(Self::not_found(path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        // Tests use absolute paths throughout, so the path is already its
        // own canonical form.
        Ok(path.to_path_buf())
    }
}
