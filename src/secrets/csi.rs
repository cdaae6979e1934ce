//! Store backed by a CSI-mounted secrets directory ("vault_csi" provider).
//!
//! Every regular file directly in the mount is one secret, keyed by its file
//! name. Top-level symlinks are followed, which is how the kubelet exposes
//! each key. Entries whose name starts with `.` are skipped; that covers the
//! `..data` link and its timestamped payload directories. Subdirectories are
//! not read, because the watch only sees changes at the top level.
//!
//! Any change in the mount triggers a full rescan. A rescan only publishes
//! when every file parses, so a half-written update is never visible.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

use crate::config::WatcherSettings;
use crate::filewatcher::wait_for_path;
use crate::watcher::{BoxError, DirectoryWatcher, DirectoryWatcherConfig, SharedLogger};

use super::error::{SecretsError, SecretsResult};
use super::middleware::{Notifier, SecretMiddleware};
use super::store::Store;
use super::types::{RawSecret, SecretEntry, Secrets, Vault};

/// A secret file is either a bare secret object or a KV read response.
#[derive(Deserialize)]
#[serde(untagged)]
enum SecretFile {
    Envelope { data: RawSecret },
    Bare(RawSecret),
}

impl SecretFile {
    fn into_raw(self) -> RawSecret {
        match self {
            SecretFile::Envelope { data } => data,
            SecretFile::Bare(raw) => raw,
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Read every secret file directly in `root`. Fails on the first
/// unreadable or invalid file.
pub(crate) fn scan_directory(
    root: &Path,
    max_file_size: u64,
) -> SecretsResult<HashMap<String, SecretEntry>> {
    let mut entries = HashMap::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let id = entry.file_name().to_string_lossy().into_owned();
        let size = entry.metadata().map_err(std::io::Error::from)?.len();
        if size > max_file_size {
            return Err(SecretsError::Invalid {
                path: id,
                reason: format!("file is {size} bytes, limit is {max_file_size}"),
            });
        }

        let bytes = fs::read(entry.path())?;
        let file: SecretFile = serde_json::from_slice(&bytes).map_err(|e| SecretsError::Invalid {
            path: id.clone(),
            reason: e.to_string(),
        })?;
        let secret = file.into_raw().into_entry(&id)?;
        entries.insert(id, secret);
    }

    Ok(entries)
}

/// Rebuilds the snapshot on directory events.
struct Rescanner {
    root: PathBuf,
    max_file_size: u64,
    current: Arc<ArcSwap<Secrets>>,
    notifier: Arc<Notifier>,
    /// Serializes scans. False until the initial load has published.
    loaded: Mutex<bool>,
}

impl Rescanner {
    fn scan(&self) -> SecretsResult<Secrets> {
        let entries = scan_directory(&self.root, self.max_file_size)?;
        Ok(Secrets::from_entries(entries, Vault::default()))
    }

    /// First load. The chain runs even when the mount is empty.
    fn load_initial(&self) -> SecretsResult<Arc<Secrets>> {
        let mut loaded = self.loaded.lock();
        let initial = Arc::new(self.scan()?);
        self.current.store(initial.clone());
        *loaded = true;
        self.notifier.notify(&initial);
        Ok(initial)
    }

    fn rescan(&self) -> Result<(), BoxError> {
        let loaded = self.loaded.lock();
        // Anything that changed before the initial load is part of it.
        if !*loaded {
            return Ok(());
        }

        let next = self.scan().inspect_err(|e| {
            tracing::warn!("[secrets] keeping previous CSI snapshot: {e}");
        })?;

        // A single atomic update fires several events; publish only real changes.
        if *self.current.load_full() == next {
            return Ok(());
        }

        let next = Arc::new(next);
        self.current.store(next.clone());
        crate::log_event!("secrets", "csi reloaded", "{} secrets", next.len());
        self.notifier.notify(&next);
        Ok(())
    }
}

/// A [`Store`] that aggregates a CSI-mounted directory of secret files.
pub struct CsiStore {
    root: PathBuf,
    current: Arc<ArcSwap<Secrets>>,
    notifier: Arc<Notifier>,
    watcher: DirectoryWatcher,
}

impl CsiStore {
    /// Wait for `dir` to exist, load it, and start watching it.
    ///
    /// Like [`FileStore::new`](super::FileStore::new) this blocks until the
    /// mount appears; bound it with a deadline.
    pub async fn new(
        scope: &CancellationToken,
        dir: impl Into<PathBuf>,
        logger: SharedLogger,
        middlewares: &[SecretMiddleware],
    ) -> SecretsResult<Self> {
        Self::with_settings(scope, dir, logger, middlewares, &WatcherSettings::default()).await
    }

    pub async fn with_settings(
        scope: &CancellationToken,
        dir: impl Into<PathBuf>,
        logger: SharedLogger,
        middlewares: &[SecretMiddleware],
        settings: &WatcherSettings,
    ) -> SecretsResult<Self> {
        let root = dir.into();
        wait_for_path(&root, settings.initial_read_interval(), scope).await?;

        let current = Arc::new(ArcSwap::from_pointee(Secrets::default()));
        let notifier = Arc::new(Notifier::new(middlewares, logger.clone()));
        let rescanner = Arc::new(Rescanner {
            root: root.clone(),
            max_file_size: settings.max_file_size,
            current: current.clone(),
            notifier: notifier.clone(),
            loaded: Mutex::new(false),
        });
        let on_create = rescanner.clone();
        let on_remove = rescanner.clone();

        // Subscribe before the first scan so no change slips in between.
        let config = DirectoryWatcherConfig::new(&root)
            .logger(logger)
            .on_create(move |_: &Path| on_create.rescan())
            .on_remove(move |_: &Path| on_remove.rescan());
        let watcher = DirectoryWatcher::start(scope, config)?;

        let initial = rescanner.load_initial()?;

        crate::log_event!(
            "secrets",
            "csi store ready",
            "{} ({} secrets)",
            root.display(),
            initial.len()
        );

        Ok(Self {
            root,
            current,
            notifier,
            watcher,
        })
    }

    /// The mount directory.
    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl Store for CsiStore {
    fn close(&self) {
        self.watcher.stop();
    }

    fn add_middlewares(&self, middlewares: &[SecretMiddleware]) {
        let chain = self.notifier.extend(middlewares);
        self.notifier.run(&chain, &self.current.load_full());
    }

    fn secrets(&self) -> Arc<Secrets> {
        self.current.load_full()
    }

    fn get_vault(&self) -> SecretsResult<Vault> {
        Err(SecretsError::Unsupported {
            operation: "get_vault",
            provider: "vault_csi",
        })
    }
}
