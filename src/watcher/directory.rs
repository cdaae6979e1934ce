//! Directory watcher with create/remove callbacks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{BoxError, WatchError, WatchResult};
use super::event::{FsAction, FsEvent, classify};
use super::logger::{SharedLogger, default_logger};
use super::source::EventSource;
use super::call_guarded;

/// Invoked on file creates and writes.
pub type OnCreate = Arc<dyn Fn(&Path) -> Result<(), BoxError> + Send + Sync>;

/// Invoked on file removals and on the old name of a renamed file.
pub type OnRemove = Arc<dyn Fn(&Path) -> Result<(), BoxError> + Send + Sync>;

/// Configuration for [`DirectoryWatcher::start`].
///
/// A missing handler means the corresponding event class has no effect.
/// If "/dir/f1" is renamed to "/dir/f2", `on_remove` sees "/dir/f1" and
/// `on_create` sees "/dir/f2".
#[derive(Clone, Default)]
pub struct DirectoryWatcherConfig {
    /// Directory to watch, required.
    pub path: PathBuf,
    pub on_create: Option<OnCreate>,
    pub on_remove: Option<OnRemove>,
    /// Defaults to a no-op sink ([`NopLogger`](super::NopLogger)).
    pub logger: Option<SharedLogger>,
}

impl DirectoryWatcherConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn on_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_create = Some(Arc::new(f));
        self
    }

    pub fn on_remove<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_remove = Some(Arc::new(f));
        self
    }

    /// Where handler failures and event-source errors are reported.
    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// Watches a directory in a background task, invoking `on_create` for
/// creates and writes and `on_remove` for removals and renames.
///
/// The watcher is stateless: it keeps no table of known files. Handlers run
/// on the background task, so a slow handler delays subsequent events.
/// Dropping the handle stops the watcher.
pub struct DirectoryWatcher {
    path: PathBuf,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    /// Subscribe to `config.path` and start the background task.
    ///
    /// The task ends when `scope` is cancelled or [`stop`](Self::stop) is
    /// called. Must be called from within a tokio runtime. No task is started
    /// if the subscription cannot be established.
    pub fn start(scope: &CancellationToken, config: DirectoryWatcherConfig) -> WatchResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| WatchError::InitFailed {
            reason: e.to_string(),
        })?;

        let mut source = EventSource::new()?;
        source.subscribe(&config.path)?;

        let cancel = scope.child_token();
        let dispatcher = Dispatcher {
            on_create: config.on_create,
            on_remove: config.on_remove,
            logger: config.logger.unwrap_or_else(default_logger),
        };
        let task = runtime.spawn(watch_loop(source, dispatcher, cancel.clone()));

        crate::log_event!("directorywatcher", "started", "{}", config.path.display());

        Ok(Self {
            path: config.path,
            cancel,
            task: Some(task),
        })
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the watcher. Calls after the first are no-ops.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the watcher and wait for the background task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Dispatcher {
    on_create: Option<OnCreate>,
    on_remove: Option<OnRemove>,
    logger: SharedLogger,
}

impl Dispatcher {
    fn dispatch(&self, event: &FsEvent) {
        let path = event.path();
        let (handler, name) = match event.action() {
            FsAction::Upsert => (self.on_create.as_ref(), "create"),
            FsAction::Remove => (self.on_remove.as_ref(), "remove"),
            FsAction::Ignore => return,
        };

        crate::debug_event!("directorywatcher", name, "{}", path.display());

        let Some(handler) = handler else {
            return;
        };

        let reason = match call_guarded(|| handler(path)) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic,
        };

        let err = WatchError::HandlerFailed {
            handler: name.to_string(),
            path: path.to_path_buf(),
            reason,
        };
        tracing::warn!("[directorywatcher] {err}");
        self.logger.log(&format!("directorywatcher: {err}"));
    }
}

async fn watch_loop(source: EventSource, dispatcher: Dispatcher, cancel: CancellationToken) {
    let EventSource {
        watcher,
        mut events,
        mut errors,
    } = source;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                drop(watcher);
                crate::debug_event!("directorywatcher", "stopped");
                return;
            }

            Some(e) = errors.recv() => {
                let err = WatchError::EventError { details: e.to_string() };
                tracing::warn!("[directorywatcher] {err}");
                dispatcher.logger.log(&format!("directorywatcher: {err}"));
            }

            Some(event) = events.recv() => {
                for fs_event in classify(&event) {
                    dispatcher.dispatch(&fs_event);
                }
            }
        }
    }
}
