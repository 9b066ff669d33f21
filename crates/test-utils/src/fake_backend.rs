// crates/test-utils/src/fake_backend.rs

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;

use tailwatch::backend::{EventKind, EventReceiver, NotifyBackend, RawEvent, SubscriptionControl};
use tailwatch::create::CreateTracker;
use tailwatch::errors::{Result, WatchError};
use tailwatch::fs::FileSystem;
use tailwatch::fs::mock::MockFileSystem;
use tailwatch::watcher::WatchContext;

/// In-memory notification backend.
///
/// Every `subscription()` call is paired with a [`FakeSubscription`] handle
/// the test can use to inject events and inspect which paths the code under
/// test watched, unwatched, or whether it released the subscription.
#[derive(Clone, Default)]
pub struct FakeBackend {
    subscriptions: Arc<Mutex<Vec<FakeSubscription>>>,
    fail_watch: Arc<Mutex<Option<String>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `watch` call fail with the given message.
    pub fn fail_watches_with(&self, message: &str) {
        *self.fail_watch.lock().unwrap() = Some(message.to_string());
    }

    /// Handle for the `index`-th subscription opened so far.
    pub fn subscription_handle(&self, index: usize) -> FakeSubscription {
        self.subscriptions.lock().unwrap()[index].clone()
    }

    /// Handle for the most recently opened subscription.
    pub fn last_subscription(&self) -> FakeSubscription {
        self.subscriptions
            .lock()
            .unwrap()
            .last()
            .expect("no subscription opened yet")
            .clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

impl NotifyBackend for FakeBackend {
    fn subscription(&self) -> Result<(Box<dyn SubscriptionControl>, EventReceiver)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SubscriptionState::default()));

        let handle = FakeSubscription {
            state: Arc::clone(&state),
            events: event_tx.downgrade(),
        };
        self.subscriptions.lock().unwrap().push(handle);

        let control = FakeControl {
            state,
            fail_watch: Arc::clone(&self.fail_watch),
            // The strong sender lives with the control, so dropping the
            // control closes the stream just like the real backend.
            _events: event_tx,
        };
        Ok((Box::new(control), event_rx))
    }
}

#[derive(Debug, Default)]
struct SubscriptionState {
    watched: Vec<PathBuf>,
    removed: Vec<PathBuf>,
    closed: bool,
}

/// Test-side handle on one fake subscription.
#[derive(Clone)]
pub struct FakeSubscription {
    state: Arc<Mutex<SubscriptionState>>,
    events: mpsc::WeakUnboundedSender<Result<RawEvent>>,
}

impl FakeSubscription {
    /// Inject one event. Dropped silently if the subscription is gone.
    pub fn emit(&self, path: impl Into<PathBuf>, kind: EventKind) {
        if let Some(tx) = self.events.upgrade() {
            let _ = tx.send(Ok(RawEvent {
                path: path.into(),
                kind,
            }));
        }
    }

    /// Inject an in-band backend error.
    pub fn emit_error(&self, message: &str) {
        if let Some(tx) = self.events.upgrade() {
            let _ = tx.send(Err(WatchError::Other(anyhow!("{message}"))));
        }
    }

    /// Paths passed to `watch`, in call order.
    pub fn watched(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().watched.clone()
    }

    /// Paths passed to `unwatch`, in call order.
    pub fn removed(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().removed.clone()
    }

    /// Whether the paired control has been dropped.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Wait until the paired control has been dropped, panicking after a
    /// short deadline. Used to assert that workers release their
    /// subscription on exit.
    pub async fn wait_closed(&self) {
        for _ in 0..200 {
            if self.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscription was not released");
    }

    /// Wait until `path` is among the watched paths, panicking after a
    /// short deadline.
    pub async fn wait_watched(&self, path: &Path) {
        for _ in 0..200 {
            if self.watched().iter().any(|watched| watched == path) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("path was never watched: {path:?}");
    }
}

struct FakeControl {
    state: Arc<Mutex<SubscriptionState>>,
    fail_watch: Arc<Mutex<Option<String>>>,
    _events: mpsc::UnboundedSender<Result<RawEvent>>,
}

impl SubscriptionControl for FakeControl {
    fn watch(&mut self, path: &Path) -> Result<()> {
        if let Some(message) = self.fail_watch.lock().unwrap().clone() {
            return Err(WatchError::Other(anyhow!("{message}: {path:?}")));
        }
        self.state.lock().unwrap().watched.push(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.state.lock().unwrap().removed.push(path.to_path_buf());
        Ok(())
    }
}

impl Drop for FakeControl {
    fn drop(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

/// Wire a watch context around a fake backend and a mock filesystem.
///
/// Subscription zero belongs to the creation registry; watchers open theirs
/// afterwards. Must be called from within a Tokio runtime.
pub fn fake_context() -> (WatchContext, FakeBackend, MockFileSystem) {
    let backend = FakeBackend::new();
    let fs = MockFileSystem::new();
    let backend_arc: Arc<dyn NotifyBackend> = Arc::new(backend.clone());
    let fs_arc: Arc<dyn FileSystem> = Arc::new(fs.clone());
    let tracker = CreateTracker::new(&backend_arc, Arc::clone(&fs_arc))
        .expect("fake subscription cannot fail");
    let ctx = WatchContext::new(backend_arc, fs_arc, tracker);
    (ctx, backend, fs)
}
