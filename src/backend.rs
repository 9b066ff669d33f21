// src/backend.rs

//! Pluggable directory-notification backend.
//!
//! The watchers talk to a [`NotifyBackend`] instead of a concrete `notify`
//! watcher. This makes it easy to drive synthetic event streams in tests
//! while keeping the platform implementation in [`RecommendedBackend`].
//!
//! A subscription is a pair: a [`SubscriptionControl`] for adding and
//! removing watched paths, and an [`EventReceiver`] carrying the decoded
//! events. Backend-level errors travel in-band as `Err` items so the
//! consuming worker can log them without tearing the stream down. Dropping
//! the control releases the underlying OS subscription and ends the stream.

use std::path::{Path, PathBuf};

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::{Result, WatchError};

/// Classified notification kind.
///
/// Platform kinds that carry no lifecycle meaning for tailing (access
/// notifications, unclassifiable noise) are dropped before they reach this
/// alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Write,
    Remove,
    Rename,
    MetaChange,
}

impl EventKind {
    /// Map a raw `notify` kind into the watcher alphabet.
    pub fn from_notify(kind: &notify::EventKind) -> Option<Self> {
        use notify::event::ModifyKind;

        match kind {
            notify::EventKind::Create(_) => Some(EventKind::Create),
            notify::EventKind::Remove(_) => Some(EventKind::Remove),
            notify::EventKind::Modify(ModifyKind::Name(_)) => Some(EventKind::Rename),
            notify::EventKind::Modify(ModifyKind::Metadata(_)) => Some(EventKind::MetaChange),
            notify::EventKind::Modify(_) => Some(EventKind::Write),
            _ => None,
        }
    }
}

/// One decoded notification: a path and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: EventKind,
}

/// Stream of decoded events for one subscription.
pub type EventReceiver = mpsc::UnboundedReceiver<Result<RawEvent>>;

/// Live handle on one subscription's watched-path set.
pub trait SubscriptionControl: Send {
    /// Start watching a single file or directory, non-recursively.
    fn watch(&mut self, path: &Path) -> Result<()>;

    /// Stop watching a path.
    fn unwatch(&mut self, path: &Path) -> Result<()>;
}

/// Source of notification subscriptions.
pub trait NotifyBackend: Send + Sync {
    /// Open a fresh subscription with an empty watched-path set.
    fn subscription(&self) -> Result<(Box<dyn SubscriptionControl>, EventReceiver)>;
}

/// Production backend on the platform watcher picked by `notify`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendedBackend;

impl NotifyBackend for RecommendedBackend {
    fn subscription(&self) -> Result<(Box<dyn SubscriptionControl>, EventReceiver)> {
        // Channel from the blocking notify callback into the async world.
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let Some(kind) = EventKind::from_notify(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        let _ = event_tx.send(Ok(RawEvent { path, kind }));
                    }
                }
                Err(err) => {
                    let _ = event_tx.send(Err(WatchError::Backend(err)));
                }
            },
            Config::default(),
        )?;

        Ok((Box::new(NotifySubscription { inner: watcher }), event_rx))
    }
}

/// Keeps the `RecommendedWatcher` alive for as long as the subscription is
/// needed. Dropping this stops the OS-level watches and closes the stream.
struct NotifySubscription {
    inner: RecommendedWatcher,
}

impl SubscriptionControl for NotifySubscription {
    fn watch(&mut self, path: &Path) -> Result<()> {
        self.inner.watch(path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.inner.unwatch(path)?;
        Ok(())
    }
}
