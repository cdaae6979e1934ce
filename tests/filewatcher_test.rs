//! FileWatcher<T> with a plain parser.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{Captured, poll_for, write_atomic};
use parking_lot::Mutex;
use secretwatch::filewatcher::OnUpdate;
use secretwatch::{BoxError, FileWatchError, FileWatcher, FileWatcherConfig};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn parse_number(bytes: &[u8]) -> Result<u32, BoxError> {
    Ok(std::str::from_utf8(bytes)?.trim().parse::<u32>()?)
}

#[tokio::test]
async fn test_publishes_before_notifying() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("n");
    fs::write(&path, "1").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let on_update: OnUpdate<u32> = Arc::new(move |v: &Arc<u32>| record.lock().push(**v));

    let scope = CancellationToken::new();
    let config = FileWatcherConfig::new(&path, parse_number).on_update(on_update);
    let watcher = FileWatcher::new(&scope, config).await.unwrap();

    assert_eq!(*watcher.get(), 1);
    assert_eq!(*seen.lock(), vec![1]);

    write_atomic(&path, "2");
    assert!(poll_for(|| seen.lock().contains(&2)).await);
    assert_eq!(*watcher.get(), 2);
}

#[tokio::test]
async fn test_failed_reparse_keeps_value_and_skips_hook() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("n");
    fs::write(&path, "7").unwrap();

    let captured = Captured::default();
    let updates = Arc::new(Mutex::new(0usize));
    let count = updates.clone();
    let on_update: OnUpdate<u32> = Arc::new(move |_: &Arc<u32>| *count.lock() += 1);

    let scope = CancellationToken::new();
    let config = FileWatcherConfig::new(&path, parse_number)
        .logger(captured.logger())
        .on_update(on_update);
    let watcher = FileWatcher::new(&scope, config).await.unwrap();

    write_atomic(&path, "seven");
    assert!(poll_for(|| captured.contains("filewatcher:")).await);
    assert_eq!(*watcher.get(), 7);
    assert_eq!(*updates.lock(), 1);
}

#[tokio::test]
async fn test_oversized_file_fails_construction() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("n");
    fs::write(&path, "12345").unwrap();

    let scope = CancellationToken::new();
    let config = FileWatcherConfig::new(&path, parse_number).max_file_size(2);
    let err = FileWatcher::new(&scope, config).await.err().unwrap();
    assert!(matches!(err, FileWatchError::TooLarge { .. }), "{err}");
}

#[tokio::test]
async fn test_cancelled_while_waiting_for_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never");

    let scope = CancellationToken::new();
    let cancel = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let config = FileWatcherConfig::new(&path, parse_number)
        .initial_read_interval(Duration::from_millis(20));
    let err = FileWatcher::new(&scope, config).await.err().unwrap();
    assert!(matches!(err, FileWatchError::Cancelled { .. }), "{err}");
}

#[tokio::test]
async fn test_deadline_bounds_construction() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never");

    let scope = CancellationToken::new();
    let config = FileWatcherConfig::new(&path, parse_number)
        .initial_read_interval(Duration::from_millis(20));
    let result = tokio::time::timeout(
        Duration::from_millis(150),
        FileWatcher::new(&scope, config),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_panicking_parser_is_contained() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("n");
    fs::write(&path, "1").unwrap();

    let captured = Captured::default();
    let scope = CancellationToken::new();
    let config = FileWatcherConfig::new(&path, |bytes: &[u8]| -> Result<u32, BoxError> {
        if bytes == b"panic" {
            panic!("parser exploded");
        }
        parse_number(bytes)
    })
    .logger(captured.logger());
    let watcher = FileWatcher::new(&scope, config).await.unwrap();

    write_atomic(&path, "panic");
    assert!(poll_for(|| captured.contains("parser exploded")).await);
    assert_eq!(*watcher.get(), 1);

    write_atomic(&path, "3");
    assert!(poll_for(|| *watcher.get() == 3).await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_follows_symlink_swaps() {
    use std::os::unix::fs::symlink;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("v1"), "1").unwrap();
    fs::write(dir.path().join("v2"), "2").unwrap();
    let link = dir.path().join("current");
    symlink("v1", &link).unwrap();

    let scope = CancellationToken::new();
    let watcher = FileWatcher::new(&scope, FileWatcherConfig::new(&link, parse_number))
        .await
        .unwrap();
    assert_eq!(*watcher.get(), 1);

    let staged = dir.path().join("current.tmp");
    symlink("v2", &staged).unwrap();
    fs::rename(&staged, &link).unwrap();

    assert!(poll_for(|| *watcher.get() == 2).await);
    watcher.shutdown().await;
}
