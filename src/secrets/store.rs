//! The [`Store`] trait and the single-file ("vault") backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::WatcherSettings;
use crate::filewatcher::{FileWatcher, FileWatcherConfig, OnUpdate};
use crate::watcher::{BoxError, SharedLogger};

use super::error::SecretsResult;
use super::middleware::{Notifier, SecretMiddleware};
use super::types::{CredentialSecret, Secrets, SimpleSecret, Vault, VersionedSecret};

/// Gives access to secrets with automatic refresh on change.
///
/// Secrets are served from memory, so fetch them from the store each time
/// they are needed instead of caching the returned values; that way rotated
/// secrets are picked up. If reloads start failing the store keeps serving
/// the last snapshot that parsed.
pub trait Store: Send + Sync {
    /// Stop watching for changes and release the watcher.
    ///
    /// Secrets stay readable as they were. Calls after the first are no-ops.
    fn close(&self);

    /// Register middlewares, then immediately run the whole chain against
    /// the current snapshot.
    ///
    /// Intended for start-up registration from a single task.
    fn add_middlewares(&self, middlewares: &[SecretMiddleware]);

    /// The current snapshot.
    fn secrets(&self) -> Arc<Secrets>;

    fn get_simple_secret(&self, path: &str) -> SecretsResult<SimpleSecret> {
        self.secrets().get_simple_secret(path)
    }

    fn get_versioned_secret(&self, path: &str) -> SecretsResult<VersionedSecret> {
        self.secrets().get_versioned_secret(path)
    }

    fn get_credential_secret(&self, path: &str) -> SecretsResult<CredentialSecret> {
        self.secrets().get_credential_secret(path)
    }

    /// URL and token for talking to Vault directly.
    fn get_vault(&self) -> SecretsResult<Vault>;
}

/// A [`Store`] backed by one JSON secrets file written by a fetcher sidecar.
pub struct FileStore {
    watcher: FileWatcher<Secrets>,
    notifier: Arc<Notifier>,
}

impl FileStore {
    /// Watch the secrets file at `path`.
    ///
    /// Blocks until the file exists and parses, so give `scope` a deadline or
    /// wrap the call in `tokio::time::timeout`.
    pub async fn new(
        scope: &CancellationToken,
        path: impl Into<PathBuf>,
        logger: SharedLogger,
        middlewares: &[SecretMiddleware],
    ) -> SecretsResult<Self> {
        Self::with_settings(scope, path, logger, middlewares, &WatcherSettings::default()).await
    }

    pub async fn with_settings(
        scope: &CancellationToken,
        path: impl Into<PathBuf>,
        logger: SharedLogger,
        middlewares: &[SecretMiddleware],
        settings: &WatcherSettings,
    ) -> SecretsResult<Self> {
        let notifier = Arc::new(Notifier::new(middlewares, logger.clone()));

        let on_update: OnUpdate<Secrets> = {
            let notifier = notifier.clone();
            Arc::new(move |secrets: &Arc<Secrets>| notifier.notify(secrets))
        };

        let config = FileWatcherConfig::new(path, |bytes: &[u8]| {
            Secrets::from_json(bytes).map_err(BoxError::from)
        })
        .with_settings(settings)
        .logger(logger)
        .on_update(on_update);

        let watcher = FileWatcher::new(scope, config).await?;
        Ok(Self { watcher, notifier })
    }

    pub fn path(&self) -> &Path {
        self.watcher.path()
    }
}

impl Store for FileStore {
    fn close(&self) {
        self.watcher.stop();
    }

    fn add_middlewares(&self, middlewares: &[SecretMiddleware]) {
        let chain = self.notifier.extend(middlewares);
        self.notifier.run(&chain, &self.watcher.get());
    }

    fn secrets(&self) -> Arc<Secrets> {
        self.watcher.get()
    }

    fn get_vault(&self) -> SecretsResult<Vault> {
        Ok(self.watcher.get().vault().clone())
    }
}
