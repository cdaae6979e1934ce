//! FileStore ("vault" provider) against a real filesystem.

mod common;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{Captured, bundle, poll_for, settle, write_atomic};
use parking_lot::Mutex;
use secretwatch::secrets::{SecretHandler, middleware};
use secretwatch::{
    FileStore, FileWatchError, NopLogger, Secrets, SecretsError, Store, WatcherSettings,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn api_key(store: &dyn Store) -> String {
    store
        .get_simple_secret("secret/svc/api-key")
        .unwrap()
        .value
        .as_str()
        .unwrap()
        .to_string()
}

/// A middleware that counts invocations and records the api key it saw.
fn counting(calls: Arc<AtomicUsize>, last: Arc<Mutex<String>>) -> secretwatch::SecretMiddleware {
    middleware(move |next: SecretHandler| -> SecretHandler {
        let calls = calls.clone();
        let last = last.clone();
        Arc::new(move |secrets: &Secrets| {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(s) = secrets.get_simple_secret("secret/svc/api-key") {
                *last.lock() = s.value.as_str().unwrap_or_default().to_string();
            }
            next(secrets);
        })
    })
}

#[tokio::test]
async fn test_reads_initial_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    fs::write(&path, bundle("v1")).unwrap();

    let scope = CancellationToken::new();
    let store = FileStore::new(&scope, &path, Arc::new(NopLogger), &[]).await.unwrap();

    assert_eq!(api_key(&store), "v1");
    let creds = store.get_credential_secret("secret/svc/db").unwrap();
    assert_eq!(creds.username, "app");

    let vault = store.get_vault().unwrap();
    assert_eq!(vault.url, "https://vault:8200/");
    assert_eq!(vault.token, "s.test");

    assert!(matches!(
        store.get_simple_secret("secret/svc/missing").unwrap_err(),
        SecretsError::NotFound { .. }
    ));
    assert!(matches!(
        store.get_versioned_secret("secret/svc/db").unwrap_err(),
        SecretsError::WrongType { .. }
    ));
}

#[tokio::test]
async fn test_picks_up_rewrites() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    fs::write(&path, bundle("v1")).unwrap();

    let scope = CancellationToken::new();
    let store = FileStore::new(&scope, &path, Arc::new(NopLogger), &[]).await.unwrap();

    write_atomic(&path, &bundle("v2"));
    assert!(poll_for(|| api_key(&store) == "v2").await);

    fs::write(&path, bundle("v3")).unwrap();
    assert!(poll_for(|| api_key(&store) == "v3").await);
}

#[tokio::test]
async fn test_bad_rewrite_keeps_last_good_value() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    fs::write(&path, bundle("v1")).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(String::new()));
    let captured = Captured::default();

    let scope = CancellationToken::new();
    let store = FileStore::new(
        &scope,
        &path,
        captured.logger(),
        &[counting(calls.clone(), last.clone())],
    )
    .await
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    write_atomic(&path, "{ this is not json");
    assert!(poll_for(|| captured.contains("filewatcher:")).await);

    assert_eq!(api_key(&store), "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    write_atomic(&path, &bundle("v2"));
    assert!(poll_for(|| api_key(&store) == "v2").await);
}

#[tokio::test]
async fn test_close_is_idempotent_and_keeps_last_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    fs::write(&path, bundle("v1")).unwrap();

    let scope = CancellationToken::new();
    let store = FileStore::new(&scope, &path, Arc::new(NopLogger), &[]).await.unwrap();

    store.close();
    store.close();
    store.close();

    write_atomic(&path, &bundle("v2"));
    settle().await;
    assert_eq!(api_key(&store), "v1");
}

#[tokio::test]
async fn test_add_middlewares_replays_against_current_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    fs::write(&path, bundle("v1")).unwrap();

    let scope = CancellationToken::new();
    let store = FileStore::new(&scope, &path, Arc::new(NopLogger), &[]).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(String::new()));
    store.add_middlewares(&[counting(calls.clone(), last.clone())]);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*last.lock(), "v1");

    // Later middlewares wrap earlier ones; both see every update.
    let outer_calls = Arc::new(AtomicUsize::new(0));
    store.add_middlewares(&[counting(outer_calls.clone(), Arc::new(Mutex::new(String::new())))]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outer_calls.load(Ordering::SeqCst), 1);

    write_atomic(&path, &bundle("v2"));
    assert!(poll_for(|| *last.lock() == "v2").await);
    assert!(poll_for(|| outer_calls.load(Ordering::SeqCst) >= 2).await);
}

#[tokio::test]
async fn test_reads_after_middleware_see_that_update() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    fs::write(&path, bundle("v1")).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(String::new()));

    let scope = CancellationToken::new();
    let store = FileStore::new(
        &scope,
        &path,
        Arc::new(NopLogger),
        &[counting(calls.clone(), last.clone())],
    )
    .await
    .unwrap();

    write_atomic(&path, &bundle("v2"));
    assert!(poll_for(|| *last.lock() == "v2").await);
    assert_eq!(api_key(&store), "v2");
}

#[tokio::test]
async fn test_waits_for_file_to_appear() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");

    let writer_path = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        write_atomic(&writer_path, &bundle("late"));
    });

    let settings = WatcherSettings {
        initial_read_interval_ms: 20,
        ..WatcherSettings::default()
    };
    let scope = CancellationToken::new();
    let store = FileStore::with_settings(&scope, &path, Arc::new(NopLogger), &[], &settings)
        .await
        .unwrap();

    assert_eq!(api_key(&store), "late");
}

#[tokio::test]
async fn test_invalid_initial_document_fails_construction() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    fs::write(
        &path,
        r#"{"secrets": {"secret/svc/api-key": {"type": "simple"}}}"#,
    )
    .unwrap();

    let scope = CancellationToken::new();
    let err = FileStore::new(&scope, &path, Arc::new(NopLogger), &[])
        .await
        .err()
        .unwrap();
    assert!(
        matches!(err, SecretsError::FileWatch(FileWatchError::Parse { .. })),
        "{err}"
    );
}

#[tokio::test]
async fn test_reloads_with_polling_enabled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    fs::write(&path, bundle("v1")).unwrap();

    let settings = WatcherSettings {
        poll_interval_ms: Some(50),
        ..WatcherSettings::default()
    };
    let scope = CancellationToken::new();
    let store = FileStore::with_settings(&scope, &path, Arc::new(NopLogger), &[], &settings)
        .await
        .unwrap();

    fs::write(&path, bundle("polled")).unwrap();
    assert!(poll_for(|| api_key(&store) == "polled").await);
}
