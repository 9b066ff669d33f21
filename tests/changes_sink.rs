// tests/changes_sink.rs

use std::error::Error;
use std::time::Duration;

use tokio::time::timeout;

use tailwatch::changes::{FileChange, change_channel};
use tailwatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn bursts_coalesce_into_one_signal() -> TestResult {
    init_tracing();
    let (notifier, mut changes) = change_channel();

    notifier.notify(FileChange::Modified);
    notifier.notify_modified();
    notifier.notify_modified();

    assert_eq!(changes.next().await, Some(FileChange::Modified));
    drop(notifier);
    assert_eq!(changes.next().await, None);
    Ok(())
}

#[tokio::test]
async fn deletion_outranks_buffered_signals() -> TestResult {
    init_tracing();
    let (notifier, mut changes) = change_channel();

    notifier.notify_modified();
    notifier.notify_truncated();
    notifier.notify_deleted();

    // Buffered modification and truncation are never seen once deletion
    // has been signalled.
    assert_eq!(changes.next().await, Some(FileChange::Deleted));
    assert_eq!(changes.next().await, None);
    Ok(())
}

#[tokio::test]
async fn deletion_retires_the_sink() -> TestResult {
    init_tracing();
    let (notifier, mut changes) = change_channel();

    notifier.notify_deleted();
    assert!(notifier.is_closed());

    notifier.notify_modified();
    notifier.notify_truncated();
    notifier.notify_deleted();

    assert_eq!(changes.next().await, Some(FileChange::Deleted));
    assert_eq!(changes.next().await, None);
    drop(notifier);
    assert_eq!(changes.next().await, None);
    Ok(())
}

#[tokio::test]
async fn drains_truncation_before_modification() -> TestResult {
    init_tracing();
    let (notifier, mut changes) = change_channel();

    notifier.notify_modified();
    notifier.notify_truncated();

    assert_eq!(changes.next().await, Some(FileChange::Truncated));
    assert_eq!(changes.next().await, Some(FileChange::Modified));
    Ok(())
}

#[tokio::test]
async fn next_waits_until_a_signal_arrives() -> TestResult {
    init_tracing();
    let (notifier, mut changes) = change_channel();

    assert!(
        timeout(Duration::from_millis(50), changes.next())
            .await
            .is_err()
    );

    notifier.notify_truncated();
    assert_eq!(changes.next().await, Some(FileChange::Truncated));
    Ok(())
}

#[tokio::test]
async fn notifying_without_a_consumer_never_blocks() -> TestResult {
    init_tracing();
    let (notifier, _changes) = change_channel();

    for _ in 0..1000 {
        notifier.notify_modified();
        notifier.notify_truncated();
    }
    Ok(())
}

#[tokio::test]
async fn clones_share_the_closed_flag() -> TestResult {
    init_tracing();
    let (notifier, mut changes) = change_channel();
    let clone = notifier.clone();

    clone.notify_deleted();
    assert!(notifier.is_closed());

    notifier.notify_modified();
    assert_eq!(changes.next().await, Some(FileChange::Deleted));
    assert_eq!(changes.next().await, None);
    Ok(())
}
