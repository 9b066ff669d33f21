// src/watcher/rotating.rs

//! Watcher for a log reached through a stable symlink.
//!
//! Rotation schemes keep a fixed indirection such as `current` pointing at
//! the newest generation file. This watcher subscribes to the symlink's
//! directory and to the resolved target at the same time: events on the
//! symlink drive retargeting, events on the target drive content changes.
//! The consumer keeps reading through the symlink path, so a retarget is
//! reported as a plain modification.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{EventKind, EventReceiver, RawEvent, SubscriptionControl};
use crate::changes::{ChangeNotifier, FileChanges, change_channel};
use crate::errors::{Result, WatchError};
use crate::fs::{FileSystem, canonical_watch_pair};

use super::{FileWatcher, Flow, WaitOutcome, WatchContext, wait_until_exists};

/// The currently resolved rotation target and the live subscription that
/// watches it. Kept in one cell so retargeting and event handling are
/// serialized, and taken out on worker exit so the subscription drops
/// deterministically.
struct TargetBinding {
    control: Box<dyn SubscriptionControl>,
    target: PathBuf,
}

/// Follows a stable symlink across log rotations.
pub struct RotatingFileWatcher {
    path: PathBuf,
    ctx: WatchContext,
    binding: Arc<Mutex<Option<TargetBinding>>>,
}

impl RotatingFileWatcher {
    pub fn new(path: impl Into<PathBuf>, ctx: WatchContext) -> Self {
        Self {
            path: path.into(),
            ctx,
            binding: Arc::new(Mutex::new(None)),
        }
    }

    /// Path the symlink currently resolves to, while a stream is active.
    pub fn current_target(&self) -> Option<PathBuf> {
        lock_binding(&self.binding)
            .as_ref()
            .map(|binding| binding.target.clone())
    }
}

impl FileWatcher for RotatingFileWatcher {
    fn block_until_exists<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<WaitOutcome>> + Send + 'a>> {
        Box::pin(wait_until_exists(
            &self.path,
            &self.ctx.tracker,
            &self.ctx.fs,
            cancel,
        ))
    }

    fn change_events(&self, cancel: &CancellationToken, pos: i64) -> Result<FileChanges> {
        // Holding the cell through setup keeps a racing second caller from
        // clobbering a live binding.
        let mut cell = lock_binding(&self.binding);
        if cell.is_some() {
            return Err(WatchError::StreamActive(self.path.clone()));
        }

        let (link_dir, link) = canonical_watch_pair(self.ctx.fs.as_ref(), &self.path)?;

        let (mut control, events) = self.ctx.backend.subscription()?;
        control.watch(&link_dir)?;

        let target = resolve_target(self.ctx.fs.as_ref(), &link, &link_dir)?;
        control.watch(&target)?;

        debug!(link = %link.display(), target = %target.display(), pos, "rotation stream started");

        let (notifier, changes) = change_channel();
        *cell = Some(TargetBinding { control, target });
        drop(cell);

        let worker = RotatingWorker {
            link,
            link_dir,
            binding: Arc::clone(&self.binding),
            events,
            notifier,
            fs: Arc::clone(&self.ctx.fs),
            pos,
        };
        tokio::spawn(worker.run(cancel.clone()));

        Ok(changes)
    }
}

/// Background task holding the subscription for one rotation stream.
struct RotatingWorker {
    link: PathBuf,
    link_dir: PathBuf,
    binding: Arc<Mutex<Option<TargetBinding>>>,
    events: EventReceiver,
    notifier: ChangeNotifier,
    fs: Arc<dyn FileSystem>,
    /// Read offset supplied at subscription time. Unlike the direct
    /// watcher's baseline this never moves; the consumer re-subscribes
    /// after repositioning.
    pos: i64,
}

impl RotatingWorker {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(link = %self.link.display(), "rotation stream cancelled");
                    break;
                }
                item = self.events.recv() => match item {
                    None => {
                        debug!(link = %self.link.display(), "notification stream ended");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(link = %self.link.display(), error = %err, "notification backend error");
                    }
                    Some(Ok(event)) => {
                        if self.handle_event(&event) == Flow::Stop {
                            break;
                        }
                    }
                },
            }
        }

        // Release the subscription; current_target reads None from here on.
        lock_binding(&self.binding).take();
    }

    fn handle_event(&self, event: &RawEvent) -> Flow {
        let mut cell = lock_binding(&self.binding);
        let Some(binding) = cell.as_mut() else {
            return Flow::Stop;
        };

        if event.path == self.link
            && matches!(event.kind, EventKind::Remove | EventKind::Rename)
        {
            return self.retarget(binding);
        }

        if event.path == binding.target {
            return match event.kind {
                EventKind::Write => self.sized_change(&binding.target),
                EventKind::Remove => {
                    self.notifier.notify_deleted();
                    Flow::Stop
                }
                _ => Flow::Continue,
            };
        }

        Flow::Continue
    }

    /// The symlink was replaced or renamed: re-resolve it and move the
    /// target watch over. A symlink that no longer resolves means the log
    /// itself is gone.
    fn retarget(&self, binding: &mut TargetBinding) -> Flow {
        match resolve_target(self.fs.as_ref(), &self.link, &self.link_dir) {
            Ok(new_target) => {
                if let Err(err) = binding.control.unwatch(&binding.target) {
                    // The old target is usually already deleted by now.
                    debug!(path = %binding.target.display(), error = %err, "failed to drop watch on previous target");
                }
                if let Err(err) = binding.control.watch(&new_target) {
                    warn!(path = %new_target.display(), error = %err, "failed to watch new rotation target");
                }
                info!(old = %binding.target.display(), new = %new_target.display(), "rotation target switched");
                binding.target = new_target;
                self.notifier.notify_modified();
                Flow::Continue
            }
            Err(err) => {
                debug!(link = %self.link.display(), error = %err, "symlink no longer resolves");
                self.notifier.notify_deleted();
                Flow::Stop
            }
        }
    }

    fn sized_change(&self, target: &Path) -> Flow {
        match self.fs.file_size(target) {
            Ok(size) => {
                if size < self.pos {
                    self.notifier.notify_truncated();
                } else {
                    self.notifier.notify_modified();
                }
                Flow::Continue
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.notifier.notify_deleted();
                Flow::Stop
            }
            Err(err) => {
                warn!(path = %target.display(), error = %err, "failed to stat rotation target");
                Flow::Continue
            }
        }
    }
}

fn lock_binding(
    binding: &Mutex<Option<TargetBinding>>,
) -> std::sync::MutexGuard<'_, Option<TargetBinding>> {
    binding.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve the symlink one hop, anchoring a relative target at the
/// symlink's own directory.
fn resolve_target(fs: &dyn FileSystem, link: &Path, link_dir: &Path) -> io::Result<PathBuf> {
    let target = fs.resolve_link(link)?;
    if target.is_absolute() {
        Ok(target)
    } else {
        Ok(link_dir.join(target))
    }
}
