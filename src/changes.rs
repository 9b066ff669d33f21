// src/changes.rs

//! Semantic change-event sink.
//!
//! A watcher worker reports file-lifecycle changes through a [`ChangeNotifier`];
//! the tailing consumer drains them from the paired [`FileChanges`] stream.
//! Each change kind occupies a one-slot channel, so bursts of identical
//! notifications coalesce while the consumer is busy instead of queueing.
//!
//! - Notifying never blocks the worker, with or without an active consumer.
//! - `Deleted` retires the sink: it is delivered at most once and nothing is
//!   observed after it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One semantic change to the watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChange {
    /// New content is available past the consumer's position.
    Modified,
    /// The file shrank below the consumer's position; it must re-seek.
    Truncated,
    /// The file is gone. Terminal.
    Deleted,
}

/// Write half of the change sink, owned by a watcher worker.
///
/// Clones share the same slots and closed flag.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    modified: mpsc::Sender<()>,
    truncated: mpsc::Sender<()>,
    deleted: mpsc::Sender<()>,
    closed: Arc<AtomicBool>,
}

impl ChangeNotifier {
    /// Dispatch one change into its slot.
    pub fn notify(&self, change: FileChange) {
        match change {
            FileChange::Modified => self.notify_modified(),
            FileChange::Truncated => self.notify_truncated(),
            FileChange::Deleted => self.notify_deleted(),
        }
    }

    pub fn notify_modified(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.modified.try_send(());
    }

    pub fn notify_truncated(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.truncated.try_send(());
    }

    /// Signal deletion and retire the sink.
    ///
    /// Exactly one deletion signal is ever sent; every notify call after
    /// this one is a no-op.
    pub fn notify_deleted(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.deleted.try_send(());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Read half of the change sink, handed to the tailing consumer.
#[derive(Debug)]
pub struct FileChanges {
    modified: mpsc::Receiver<()>,
    truncated: mpsc::Receiver<()>,
    deleted: mpsc::Receiver<()>,
    modified_done: bool,
    truncated_done: bool,
    deleted_done: bool,
    finished: bool,
}

impl FileChanges {
    /// Next change, or `None` once the stream is over.
    ///
    /// Pending signals are drained deletion first, then truncation, then
    /// modification. After `Deleted` has been returned, or after every
    /// notifier has been dropped and the slots are empty, all further calls
    /// return `None`.
    pub async fn next(&mut self) -> Option<FileChange> {
        if self.finished {
            return None;
        }

        loop {
            tokio::select! {
                biased;

                signal = self.deleted.recv(), if !self.deleted_done => match signal {
                    Some(()) => {
                        self.finished = true;
                        return Some(FileChange::Deleted);
                    }
                    None => self.deleted_done = true,
                },
                signal = self.truncated.recv(), if !self.truncated_done => match signal {
                    Some(()) => return Some(FileChange::Truncated),
                    None => self.truncated_done = true,
                },
                signal = self.modified.recv(), if !self.modified_done => match signal {
                    Some(()) => return Some(FileChange::Modified),
                    None => self.modified_done = true,
                },
                else => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

/// Build a connected notifier/stream pair.
pub fn change_channel() -> (ChangeNotifier, FileChanges) {
    let (modified_tx, modified_rx) = mpsc::channel(1);
    let (truncated_tx, truncated_rx) = mpsc::channel(1);
    let (deleted_tx, deleted_rx) = mpsc::channel(1);

    let notifier = ChangeNotifier {
        modified: modified_tx,
        truncated: truncated_tx,
        deleted: deleted_tx,
        closed: Arc::new(AtomicBool::new(false)),
    };
    let changes = FileChanges {
        modified: modified_rx,
        truncated: truncated_rx,
        deleted: deleted_rx,
        modified_done: false,
        truncated_done: false,
        deleted_done: false,
        finished: false,
    };
    (notifier, changes)
}
