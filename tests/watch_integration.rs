// tests/watch_integration.rs
//
// End-to-end coverage against the platform notification backend and a real
// temporary directory. Inotify and friends deliver notifications with their
// own timing and batching, so these tests assert on the semantic stream
// with generous deadlines rather than on exact event counts.

use std::error::Error;
use std::fs;
use std::io::Write;
use std::time::Duration;

use tempfile::tempdir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tailwatch::changes::{FileChange, FileChanges};
use tailwatch::watcher::{
    DirectFileWatcher, FileWatcher, WaitOutcome, WatchContext, WatchPolicy, watcher_for,
};
use tailwatch_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

async fn next_change(changes: &mut FileChanges) -> Option<FileChange> {
    timeout(Duration::from_secs(5), changes.next())
        .await
        .expect("no change within deadline")
}

/// Drain the stream until `want` shows up, tolerating however many
/// intermediate notifications the platform batches in between.
async fn drain_until(changes: &mut FileChanges, want: FileChange) {
    loop {
        match next_change(changes).await {
            Some(change) if change == want => return,
            Some(FileChange::Modified) | Some(FileChange::Truncated) => {}
            other => panic!("stream ended while waiting for {want:?}, got {other:?}"),
        }
    }
}

async fn drain_to_end(changes: &mut FileChanges) {
    while next_change(changes).await.is_some() {}
}

#[tokio::test]
async fn direct_watcher_follows_appends_and_removal() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let root = dir.path().canonicalize()?;
    let path = root.join("app.log");
    fs::write(&path, b"hello")?;

    let ctx = WatchContext::recommended()?.with_policy(WatchPolicy {
        remove_grace: Duration::from_millis(50),
    });
    let watcher = DirectFileWatcher::new(&path, ctx);
    let cancel = CancellationToken::new();

    assert_eq!(
        watcher.block_until_exists(&cancel).await?,
        WaitOutcome::Exists
    );
    let mut changes = watcher.change_events(&cancel, 5)?;

    let mut file = fs::OpenOptions::new().append(true).open(&path)?;
    file.write_all(b" world")?;
    file.sync_all()?;
    drop(file);
    drain_until(&mut changes, FileChange::Modified).await;

    fs::remove_file(&path)?;
    drain_until(&mut changes, FileChange::Deleted).await;
    assert_eq!(next_change(&mut changes).await, None);
    Ok(())
}

#[tokio::test]
async fn direct_watcher_detects_truncation() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let root = dir.path().canonicalize()?;
    let path = root.join("app.log");
    fs::write(&path, b"0123456789")?;

    let ctx = WatchContext::recommended()?;
    let watcher = DirectFileWatcher::new(&path, ctx);
    let cancel = CancellationToken::new();
    let mut changes = watcher.change_events(&cancel, 10)?;

    let file = fs::OpenOptions::new().write(true).open(&path)?;
    file.set_len(2)?;
    file.sync_all()?;
    drop(file);

    drain_until(&mut changes, FileChange::Truncated).await;

    cancel.cancel();
    drain_to_end(&mut changes).await;
    Ok(())
}

#[tokio::test]
async fn creation_resolves_block_until_exists() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let root = dir.path().canonicalize()?;
    let path = root.join("late.log");

    let ctx = WatchContext::recommended()?;
    let watcher = DirectFileWatcher::new(&path, ctx);
    let cancel = CancellationToken::new();
    let waiter_cancel = cancel.clone();
    let handle = tokio::spawn(async move { watcher.block_until_exists(&waiter_cancel).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!handle.is_finished());

    fs::write(&path, b"here now")?;
    assert_eq!(with_timeout(handle).await??, WaitOutcome::Exists);
    Ok(())
}

#[tokio::test]
async fn factory_picks_a_working_variant() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let root = dir.path().canonicalize()?;
    let path = root.join("app.log");
    fs::write(&path, b"x")?;

    let watcher = watcher_for(&path, WatchContext::recommended()?, false);
    let cancel = CancellationToken::new();
    assert_eq!(
        watcher.block_until_exists(&cancel).await?,
        WaitOutcome::Exists
    );
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn rotating_watcher_follows_a_symlink_repoint() -> TestResult {
    use std::os::unix::fs::symlink;

    use tailwatch::watcher::RotatingFileWatcher;

    init_tracing();
    let dir = tempdir()?;
    let root = dir.path().canonicalize()?;
    let gen1 = root.join("app.1");
    let gen2 = root.join("app.2");
    let link = root.join("current");
    fs::write(&gen1, b"one\n")?;
    symlink(&gen1, &link)?;

    let ctx = WatchContext::recommended()?;
    let watcher = RotatingFileWatcher::new(&link, ctx);
    let cancel = CancellationToken::new();
    let mut changes = watcher.change_events(&cancel, 0)?;
    assert_eq!(watcher.current_target(), Some(gen1.clone()));

    let mut file = fs::OpenOptions::new().append(true).open(&gen1)?;
    file.write_all(b"more\n")?;
    file.sync_all()?;
    drop(file);
    drain_until(&mut changes, FileChange::Modified).await;

    // Repoint the symlink atomically: create the replacement under a
    // temporary name, then rename it over the old link.
    fs::write(&gen2, b"two\n")?;
    let staging = root.join("current.tmp");
    symlink(&gen2, &staging)?;
    fs::rename(&staging, &link)?;

    let mut switched = false;
    for _ in 0..500 {
        if watcher.current_target() == Some(gen2.clone()) {
            switched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(switched, "watcher never picked up the new rotation target");
    drain_until(&mut changes, FileChange::Modified).await;

    let mut file = fs::OpenOptions::new().append(true).open(&gen2)?;
    file.write_all(b"and more\n")?;
    file.sync_all()?;
    drop(file);
    drain_until(&mut changes, FileChange::Modified).await;

    cancel.cancel();
    drain_to_end(&mut changes).await;
    Ok(())
}
