// src/create.rs

//! Shared creation-watch registry.
//!
//! Waiting for a file to appear needs a watch on its containing directory.
//! Rather than opening one OS subscription per waiter, a [`CreateTracker`]
//! holds a single subscription for the whole process, refcounts the watched
//! directories, and fans creation events out on a broadcast channel. Waiters
//! register interest through [`CreateTracker::register`] and hold the
//! returned guard for as long as they care.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::backend::{EventKind, NotifyBackend, SubscriptionControl};
use crate::errors::Result;
use crate::fs::{FileSystem, canonical_watch_pair};

/// Capacity of the creation fan-out channel. Waiters that fall behind
/// re-check existence directly instead of trusting a lagged stream.
const CREATED_CHANNEL_CAPACITY: usize = 64;

/// Process-wide registry of directories watched for file creation.
pub struct CreateTracker {
    inner: Mutex<TrackerInner>,
    created: broadcast::Sender<PathBuf>,
    fs: Arc<dyn FileSystem>,
}

struct TrackerInner {
    control: Box<dyn SubscriptionControl>,
    dirs: HashMap<PathBuf, usize>,
}

impl CreateTracker {
    /// Open the shared subscription and start the pump task that forwards
    /// creation events onto the broadcast channel.
    ///
    /// Must be called from within a Tokio runtime. The pump ends when the
    /// tracker is dropped and its subscription closes.
    pub fn new(backend: &Arc<dyn NotifyBackend>, fs: Arc<dyn FileSystem>) -> Result<Arc<Self>> {
        let (control, mut events) = backend.subscription()?;
        let (created, _) = broadcast::channel(CREATED_CHANNEL_CAPACITY);

        let tracker = Arc::new(Self {
            inner: Mutex::new(TrackerInner {
                control,
                dirs: HashMap::new(),
            }),
            created: created.clone(),
            fs,
        });

        tokio::spawn(async move {
            while let Some(item) = events.recv().await {
                match item {
                    Ok(event) => {
                        // A file moved into place raises a rename, not a
                        // create, at the destination path.
                        if matches!(event.kind, EventKind::Create | EventKind::Rename) {
                            let _ = created.send(event.path);
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "creation watch backend error");
                    }
                }
            }
            debug!("creation watch stream ended");
        });

        Ok(tracker)
    }

    /// Register interest in the creation of `path`.
    ///
    /// The containing directory starts being watched on its first
    /// registration. The returned guard releases the interest when dropped
    /// and carries the canonical absolute path that creation events are
    /// compared against.
    pub fn register(self: &Arc<Self>, path: &Path) -> Result<CreateRegistration> {
        let (dir, expected) = canonical_watch_pair(self.fs.as_ref(), path)?;

        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let count = inner.dirs.get(&dir).copied().unwrap_or(0);
        if count == 0 {
            inner.control.watch(&dir)?;
        }
        inner.dirs.insert(dir.clone(), count + 1);
        debug!(dir = %dir.display(), refs = count + 1, "creation watch registered");

        Ok(CreateRegistration {
            tracker: Arc::clone(self),
            dir,
            expected,
        })
    }

    /// Subscribe to the shared stream of created paths.
    pub fn events(&self) -> broadcast::Receiver<PathBuf> {
        self.created.subscribe()
    }

    fn release(&self, dir: &Path) {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let Some(count) = inner.dirs.get_mut(dir) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            inner.dirs.remove(dir);
            if let Err(err) = inner.control.unwatch(dir) {
                debug!(dir = %dir.display(), error = %err, "failed to drop creation watch");
            } else {
                debug!(dir = %dir.display(), "creation watch released");
            }
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CreateTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateTracker").finish_non_exhaustive()
    }
}

/// Guard for one registered creation interest.
#[derive(Debug)]
pub struct CreateRegistration {
    tracker: Arc<CreateTracker>,
    dir: PathBuf,
    expected: PathBuf,
}

impl CreateRegistration {
    /// Canonical absolute path creation events should be compared against.
    pub fn expected_path(&self) -> &Path {
        &self.expected
    }

    /// Release the interest now instead of at scope end.
    pub fn release(self) {}
}

impl Drop for CreateRegistration {
    fn drop(&mut self) {
        self.tracker.release(&self.dir);
    }
}
