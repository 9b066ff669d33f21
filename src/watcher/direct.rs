// src/watcher/direct.rs

//! Watcher for one concrete file path.
//!
//! Subscribes to the file's containing directory, since the path itself may
//! be removed and replaced while it is being followed, and classifies every
//! notification for the exact path by re-reading the file size.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{EventKind, EventReceiver, RawEvent, SubscriptionControl};
use crate::changes::{ChangeNotifier, FileChange, FileChanges, change_channel};
use crate::errors::Result;
use crate::fs::{FileSystem, canonical_watch_pair};

use super::{FileWatcher, Flow, WaitOutcome, WatchContext, wait_until_exists};

/// Last recorded size of the watched file.
///
/// Pure transition logic kept apart from the IO loop so the size-comparison
/// rules can be exercised on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBaseline(i64);

impl SizeBaseline {
    pub fn new(pos: i64) -> Self {
        Self(pos)
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    /// Record a newly observed size and classify the transition.
    ///
    /// Shrinking is a truncation, growth is a modification, equality is
    /// nothing. The baseline follows the observed size in every case.
    pub fn observe(&mut self, size: i64) -> Option<FileChange> {
        let previous = self.0;
        self.0 = size;
        if size < previous {
            Some(FileChange::Truncated)
        } else if size > previous {
            Some(FileChange::Modified)
        } else {
            None
        }
    }

    /// Reset after the path was atomically replaced by a new file, whose
    /// content starts from zero.
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Follows one concrete file path through modification, truncation,
/// replacement and deletion.
pub struct DirectFileWatcher {
    path: PathBuf,
    ctx: WatchContext,
}

impl DirectFileWatcher {
    pub fn new(path: impl Into<PathBuf>, ctx: WatchContext) -> Self {
        Self {
            path: path.into(),
            ctx,
        }
    }
}

impl FileWatcher for DirectFileWatcher {
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
        let (dir, target) = canonical_watch_pair(self.ctx.fs.as_ref(), &self.path)?;

        let (mut control, events) = self.ctx.backend.subscription()?;
        control.watch(&dir)?;

        debug!(path = %target.display(), pos, "change stream started");

        let (notifier, changes) = change_channel();
        let worker = DirectWorker {
            target,
            _control: control,
            events,
            notifier,
            fs: Arc::clone(&self.ctx.fs),
            baseline: SizeBaseline::new(pos),
            grace: self.ctx.policy.remove_grace,
        };
        tokio::spawn(worker.run(cancel.clone()));

        Ok(changes)
    }
}

/// Background task holding the directory subscription for one stream.
///
/// The subscription lives in `_control`; its drop at the end of [`run`]
/// releases the directory watch on every exit path.
struct DirectWorker {
    target: PathBuf,
    _control: Box<dyn SubscriptionControl>,
    events: EventReceiver,
    notifier: ChangeNotifier,
    fs: Arc<dyn FileSystem>,
    baseline: SizeBaseline,
    grace: Duration,
}

impl DirectWorker {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(path = %self.target.display(), "change stream cancelled");
                    break;
                }
                item = self.events.recv() => match item {
                    None => {
                        debug!(path = %self.target.display(), "notification stream ended");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(path = %self.target.display(), error = %err, "notification backend error");
                    }
                    Some(Ok(event)) => {
                        if self.handle_event(&event).await == Flow::Stop {
                            break;
                        }
                    }
                },
            }
        }
    }

    async fn handle_event(&mut self, event: &RawEvent) -> Flow {
        if event.path != self.target {
            return Flow::Continue;
        }

        if event.kind == EventKind::Remove {
            return self.handle_remove().await;
        }

        match self.fs.file_size(&self.target) {
            Ok(size) => {
                if let Some(change) = self.baseline.observe(size) {
                    self.notifier.notify(change);
                }
                Flow::Continue
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.notifier.notify_deleted();
                Flow::Stop
            }
            Err(err) => {
                warn!(path = %self.target.display(), error = %err, "failed to stat watched file");
                Flow::Continue
            }
        }
    }

    /// A remove notification can mean deletion or the first half of an
    /// atomic replace. Give the replacement a moment to land, then decide.
    async fn handle_remove(&mut self) -> Flow {
        tokio::time::sleep(self.grace).await;

        match self.fs.entry_exists(&self.target) {
            Ok(false) => {
                self.notifier.notify_deleted();
                Flow::Stop
            }
            Ok(true) => {
                info!(path = %self.target.display(), "file replaced, following new file");
                self.baseline.reset();
                self.notifier.notify_modified();
                Flow::Continue
            }
            Err(err) => {
                warn!(path = %self.target.display(), error = %err, "failed to re-check removed file");
                Flow::Continue
            }
        }
    }
}
