// tests/create_tracker.rs

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::timeout;

use tailwatch::backend::EventKind;
use tailwatch_test_utils::{fake_backend::fake_context, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn one_directory_watch_is_shared_by_registrations() -> TestResult {
    init_tracing();
    let (ctx, backend, _fs) = fake_context();
    let sub = backend.subscription_handle(0);

    let reg_a = ctx.tracker.register(Path::new("/logs/a.log"))?;
    let reg_b = ctx.tracker.register(Path::new("/logs/b.log"))?;
    assert_eq!(sub.watched(), vec![PathBuf::from("/logs")]);

    drop(reg_a);
    assert!(sub.removed().is_empty());

    reg_b.release();
    assert_eq!(sub.removed(), vec![PathBuf::from("/logs")]);
    Ok(())
}

#[tokio::test]
async fn distinct_directories_get_their_own_watches() -> TestResult {
    init_tracing();
    let (ctx, backend, _fs) = fake_context();
    let sub = backend.subscription_handle(0);

    let _reg_a = ctx.tracker.register(Path::new("/logs/a.log"))?;
    let _reg_b = ctx.tracker.register(Path::new("/var/b.log"))?;

    let watched = sub.watched();
    assert!(watched.contains(&PathBuf::from("/logs")));
    assert!(watched.contains(&PathBuf::from("/var")));
    Ok(())
}

#[tokio::test]
async fn creations_fan_out_to_every_subscriber() -> TestResult {
    init_tracing();
    let (ctx, backend, _fs) = fake_context();
    let _reg = ctx.tracker.register(Path::new("/logs/app.log"))?;

    let mut first = ctx.tracker.events();
    let mut second = ctx.tracker.events();

    backend
        .subscription_handle(0)
        .emit("/logs/app.log", EventKind::Create);

    assert_eq!(with_timeout(first.recv()).await?, PathBuf::from("/logs/app.log"));
    assert_eq!(with_timeout(second.recv()).await?, PathBuf::from("/logs/app.log"));
    Ok(())
}

#[tokio::test]
async fn writes_are_not_reported_as_creations() -> TestResult {
    init_tracing();
    let (ctx, backend, _fs) = fake_context();
    let _reg = ctx.tracker.register(Path::new("/logs/app.log"))?;

    let mut created = ctx.tracker.events();
    backend
        .subscription_handle(0)
        .emit("/logs/app.log", EventKind::Write);

    assert!(
        timeout(Duration::from_millis(50), created.recv())
            .await
            .is_err()
    );
    Ok(())
}

#[tokio::test]
async fn registration_fails_when_the_watch_cannot_start() -> TestResult {
    init_tracing();
    let (ctx, backend, _fs) = fake_context();
    backend.fail_watches_with("inotify limit reached");

    let err = ctx
        .tracker
        .register(Path::new("/logs/app.log"))
        .expect_err("watch failure must surface");
    assert!(err.to_string().contains("inotify limit reached"));
    Ok(())
}

#[tokio::test]
async fn a_path_without_a_file_name_is_rejected() -> TestResult {
    init_tracing();
    let (ctx, _backend, _fs) = fake_context();

    let err = ctx
        .tracker
        .register(Path::new("/"))
        .expect_err("the filesystem root is not a watchable file");
    assert!(err.to_string().contains("no watchable file name"));
    Ok(())
}
