//! Shared helpers for the watcher integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use secretwatch::SharedLogger;
use tokio::time::{Instant, sleep};

/// How long to wait for a filesystem change to be observed.
pub const WINDOW: Duration = Duration::from_secs(5);

/// Re-check `cond` every few milliseconds until it holds or [`WINDOW`]
/// elapses. Returns whether it held.
pub async fn poll_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WINDOW;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Give the watcher time to deliver anything still in flight.
pub async fn settle() {
    sleep(Duration::from_millis(300)).await;
}

/// Replace `path` the way secret writers do: write a sibling, then rename.
pub fn write_atomic(path: &Path, contents: &str) {
    let name = path.file_name().unwrap().to_string_lossy();
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    fs::write(&tmp, contents).unwrap();
    fs::rename(&tmp, path).unwrap();
}

/// A secrets bundle with one simple secret and Vault connection info.
pub fn bundle(api_key: &str) -> String {
    format!(
        r#"{{
            "secrets": {{
                "secret/svc/api-key": {{"type": "simple", "value": "{api_key}"}},
                "secret/svc/db": {{"type": "credential", "username": "app", "password": "pw"}}
            }},
            "vault": {{"url": "https://vault:8200/", "token": "s.test"}}
        }}"#
    )
}

/// Collects everything sent to a [`SharedLogger`].
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<String>>>);

impl Captured {
    pub fn logger(&self) -> SharedLogger {
        let sink = self.0.clone();
        Arc::new(move |message: &str| sink.lock().push(message.to_string()))
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.lock().iter().any(|m| m.contains(needle))
    }
}
