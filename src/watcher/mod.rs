// src/watcher/mod.rs

//! File-lifecycle watchers.
//!
//! Two implementations of [`FileWatcher`] turn raw directory notifications
//! into the semantic change stream a tail reader consumes:
//!
//! - [`DirectFileWatcher`] follows one concrete path through appends,
//!   truncations, in-place replacement and deletion.
//! - [`RotatingFileWatcher`] follows a stable symlink whose target is
//!   swapped on log rotation.
//!
//! Both share the creation-wait logic in this module: register with the
//! creation registry first, then check existence, so a file that appears
//! between the two steps is never missed.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{NotifyBackend, RecommendedBackend};
use crate::changes::FileChanges;
use crate::create::CreateTracker;
use crate::errors::{Result, WatchError};
use crate::fs::{FileSystem, RealFileSystem};

pub mod direct;
pub mod rotating;

pub use direct::{DirectFileWatcher, SizeBaseline};
pub use rotating::RotatingFileWatcher;

/// Outcome of waiting for a watch target to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The target exists; change streaming can start.
    Exists,
    /// The wait was cancelled before the target appeared.
    Cancelled,
}

/// Tunable timing behaviour shared by the watchers.
#[derive(Debug, Clone, Copy)]
pub struct WatchPolicy {
    /// How long to wait after a remove notification before deciding whether
    /// the file is gone for good or was atomically replaced.
    pub remove_grace: Duration,
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            remove_grace: Duration::from_millis(100),
        }
    }
}

/// Shared collaborators handed to every watcher.
#[derive(Clone)]
pub struct WatchContext {
    pub backend: Arc<dyn NotifyBackend>,
    pub fs: Arc<dyn FileSystem>,
    pub tracker: Arc<CreateTracker>,
    pub policy: WatchPolicy,
}

impl WatchContext {
    pub fn new(
        backend: Arc<dyn NotifyBackend>,
        fs: Arc<dyn FileSystem>,
        tracker: Arc<CreateTracker>,
    ) -> Self {
        Self {
            backend,
            fs,
            tracker,
            policy: WatchPolicy::default(),
        }
    }

    /// Production wiring: the platform notification backend, the real
    /// filesystem and a fresh creation registry.
    ///
    /// Must be called from within a Tokio runtime; the registry spawns its
    /// pump task immediately.
    pub fn recommended() -> Result<Self> {
        let backend: Arc<dyn NotifyBackend> = Arc::new(RecommendedBackend);
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let tracker = CreateTracker::new(&backend, Arc::clone(&fs))?;
        Ok(Self::new(backend, fs, tracker))
    }

    pub fn with_policy(mut self, policy: WatchPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchContext")
            .field("fs", &self.fs)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Capability surface a tail reader drives.
///
/// The boxed-future signature keeps the trait object-safe, so consumers can
/// hold either watcher variant behind `Box<dyn FileWatcher>`.
pub trait FileWatcher: Send {
    /// Resolve once the watched target exists, or the token fires.
    ///
    /// Cancellation is an outcome, not an error, and is never conflated
    /// with deletion.
    fn block_until_exists<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<WaitOutcome>> + Send + 'a>>;

    /// Start streaming change events, comparing observed sizes against
    /// `pos`, the consumer's current read offset.
    ///
    /// Subscription failures are returned synchronously and leave nothing
    /// running. On success a background worker owns the subscription until
    /// the file is deleted or `cancel` fires.
    fn change_events(&self, cancel: &CancellationToken, pos: i64) -> Result<FileChanges>;
}

/// Pick the watcher variant for `path`.
///
/// `rotating` selects the symlink-following implementation used for logs
/// reached through a stable indirection.
pub fn watcher_for(
    path: impl Into<PathBuf>,
    ctx: WatchContext,
    rotating: bool,
) -> Box<dyn FileWatcher> {
    if rotating {
        Box::new(RotatingFileWatcher::new(path, ctx))
    } else {
        Box::new(DirectFileWatcher::new(path, ctx))
    }
}

/// Whether a worker loop keeps going after handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Wait for `path` to exist.
///
/// The registration happens before the authoritative existence check, so a
/// file created between the two is caught by the check rather than lost.
/// A lagged creation stream re-runs the check instead of trusting missed
/// events.
pub(crate) async fn wait_until_exists(
    path: &Path,
    tracker: &Arc<CreateTracker>,
    fs: &Arc<dyn FileSystem>,
    cancel: &CancellationToken,
) -> Result<WaitOutcome> {
    let registration = tracker.register(path)?;
    let mut created = tracker.events();

    if fs.path_exists(path)? {
        return Ok(WaitOutcome::Exists);
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            event = created.recv() => match event {
                Ok(created_path) => {
                    if created_path.as_path() == registration.expected_path() {
                        return Ok(WaitOutcome::Exists);
                    }
                    debug!(path = %created_path.display(), "ignoring unrelated creation");
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "creation stream lagged, re-checking existence");
                    if fs.path_exists(path)? {
                        return Ok(WaitOutcome::Exists);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(WatchError::CreationWatchClosed);
                }
            },
        }
    }
}
