// crates/test-utils/src/lib.rs

//! Shared helpers for the tailwatch test suites: a process-wide tracing
//! setup and a deadline wrapper for awaiting watcher activity.

pub mod fake_backend;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound on anything a test awaits. Generous, because the real
/// notification backend batches and delays on its own schedule.
const TEST_DEADLINE: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install the tracing subscriber for a test binary, once.
///
/// Output goes through `with_test_writer`, so the harness shows it only
/// for failing tests (or under `-- --nocapture`). Raise the level with
/// `RUST_LOG`, e.g. `RUST_LOG=tailwatch=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, panicking if it outlives the shared test deadline.
pub async fn with_timeout<F: Future>(f: F) -> F::Output {
    tokio::time::timeout(TEST_DEADLINE, f)
        .await
        .expect("future did not resolve within the test deadline")
}
