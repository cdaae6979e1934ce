//! Single-file snapshot watcher.
//!
//! [`FileWatcher`] reads a file, parses it into a `T`, and re-parses it on
//! every change. Readers always get the last value that parsed successfully;
//! a failed re-parse is logged and leaves that value in place.
//!
//! The parent directory is watched rather than the file itself so that
//! atomic replacement (write to a temp file, rename over the target) and
//! symlink swaps are picked up.

mod error;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;

use crate::config::WatcherSettings;
use crate::watcher::{
    BoxError, EventSource, FsAction, SharedLogger, WatchError, call_guarded, classify,
    default_logger,
};

pub use error::{FileWatchError, FileWatchResult};

/// Files larger than this are rejected unless configured otherwise.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 << 20;

/// How often to re-check for a file that does not exist yet.
pub const DEFAULT_INITIAL_READ_INTERVAL: Duration = Duration::from_secs(1);

/// Turns raw file content into a value.
pub type Parser<T> = Arc<dyn Fn(&[u8]) -> Result<T, BoxError> + Send + Sync>;

/// Called with every newly published value, after readers can see it.
pub type OnUpdate<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

/// Configuration for [`FileWatcher::new`].
pub struct FileWatcherConfig<T> {
    pub path: PathBuf,
    pub parser: Parser<T>,
    pub logger: SharedLogger,
    pub on_update: Option<OnUpdate<T>>,
    pub max_file_size: u64,
    pub initial_read_interval: Duration,
    /// Periodic mtime/size check for filesystems that drop notifications.
    pub poll_interval: Option<Duration>,
}

impl<T> FileWatcherConfig<T> {
    pub fn new<F>(path: impl Into<PathBuf>, parser: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            parser: Arc::new(parser),
            logger: default_logger(),
            on_update: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            initial_read_interval: DEFAULT_INITIAL_READ_INTERVAL,
            poll_interval: None,
        }
    }

    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn on_update(mut self, on_update: OnUpdate<T>) -> Self {
        self.on_update = Some(on_update);
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn initial_read_interval(mut self, every: Duration) -> Self {
        self.initial_read_interval = every;
        self
    }

    pub fn poll_interval(mut self, every: Option<Duration>) -> Self {
        self.poll_interval = every;
        self
    }

    /// Apply the `[watcher]` section of the settings file.
    pub fn with_settings(self, settings: &WatcherSettings) -> Self {
        self.max_file_size(settings.max_file_size)
            .initial_read_interval(settings.initial_read_interval())
            .poll_interval(settings.poll_interval())
    }
}

/// Watches one file and keeps the last successfully parsed value.
///
/// Dropping the handle stops the watcher.
pub struct FileWatcher<T> {
    path: PathBuf,
    current: Arc<ArcSwap<T>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> FileWatcher<T> {
    /// Wait for the file to exist, parse it, and start watching it.
    ///
    /// This blocks until the file appears, so callers should bound it with a
    /// deadline (`tokio::time::timeout`) or cancel `scope`. Fails if the
    /// first parse fails or the parent directory cannot be watched.
    pub async fn new(scope: &CancellationToken, config: FileWatcherConfig<T>) -> FileWatchResult<Self> {
        let cancel = scope.child_token();
        let path = config.path.clone();

        wait_for_path(&path, config.initial_read_interval, &cancel).await?;

        // Subscribe before the first read so no change slips in between.
        let mut source = EventSource::new()?;
        source.subscribe(&watch_dir(&path))?;

        let initial = Arc::new(load(&path, &config.parser, config.max_file_size)?);
        let current = Arc::new(ArcSwap::new(initial.clone()));

        let reloader = Reloader {
            target_name: path.file_name().map(|n| n.to_os_string()),
            follows_symlink: fs::symlink_metadata(&path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false),
            fingerprint: fingerprint(&path),
            path: path.clone(),
            parser: config.parser,
            logger: config.logger,
            on_update: config.on_update,
            max_file_size: config.max_file_size,
            current: current.clone(),
        };
        reloader.notify(&initial);

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| WatchError::InitFailed {
            reason: e.to_string(),
        })?;
        let task = runtime.spawn(reload_loop(source, reloader, config.poll_interval, cancel.clone()));

        crate::log_event!("filewatcher", "watching", "{}", path.display());

        Ok(Self {
            path,
            current,
            cancel,
            task: Some(task),
        })
    }
}

impl<T> FileWatcher<T> {
    /// The last successfully parsed value. Never blocks.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop watching. The last value stays readable. Calls after the first
    /// are no-ops.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop and wait for the background task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T> Drop for FileWatcher<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wait until `path` exists, re-checking every `every`.
pub(crate) async fn wait_for_path(
    path: &Path,
    every: Duration,
    cancel: &CancellationToken,
) -> FileWatchResult<()> {
    loop {
        if path.exists() {
            return Ok(());
        }
        crate::debug_event!("filewatcher", "waiting", "{}", path.display());

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(FileWatchError::Cancelled { path: path.to_path_buf() });
            }
            _ = sleep(every) => {}
        }
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn read_limited(path: &Path, limit: u64) -> FileWatchResult<Vec<u8>> {
    let io_err = |source| FileWatchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let size = fs::metadata(path).map_err(io_err)?.len();
    if size > limit {
        return Err(FileWatchError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit,
        });
    }

    let bytes = fs::read(path).map_err(io_err)?;
    if bytes.len() as u64 > limit {
        return Err(FileWatchError::TooLarge {
            path: path.to_path_buf(),
            size: bytes.len() as u64,
            limit,
        });
    }
    Ok(bytes)
}

fn load<T>(path: &Path, parser: &Parser<T>, limit: u64) -> FileWatchResult<T> {
    let bytes = read_limited(path, limit)?;
    match call_guarded(|| parser(&bytes)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(FileWatchError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        Err(panic) => Err(FileWatchError::Parse {
            path: path.to_path_buf(),
            reason: panic,
        }),
    }
}

type Fingerprint = Option<(SystemTime, u64)>;

fn fingerprint(path: &Path) -> Fingerprint {
    let meta = fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

/// Background-task state: the sole writer of `current`.
struct Reloader<T> {
    path: PathBuf,
    target_name: Option<OsString>,
    follows_symlink: bool,
    fingerprint: Fingerprint,
    parser: Parser<T>,
    logger: SharedLogger,
    on_update: Option<OnUpdate<T>>,
    max_file_size: u64,
    current: Arc<ArcSwap<T>>,
}

impl<T> Reloader<T> {
    /// Whether an event in the parent directory may have changed the target.
    ///
    /// A symlinked target (kubelet `..data` swaps) can change through any
    /// entry in the directory.
    fn concerns(&self, path: &Path, action: FsAction) -> bool {
        match action {
            FsAction::Ignore => false,
            _ if self.follows_symlink => true,
            _ => path.file_name().map(|n| n.to_os_string()) == self.target_name,
        }
    }

    fn reload(&mut self) {
        self.fingerprint = fingerprint(&self.path);

        match load(&self.path, &self.parser, self.max_file_size) {
            Ok(value) => {
                let value = Arc::new(value);
                self.current.store(value.clone());
                crate::log_event!("filewatcher", "reloaded", "{}", self.path.display());
                self.notify(&value);
            }
            Err(e) => {
                tracing::warn!("[filewatcher] keeping previous value: {e}");
                self.logger.log(&format!("filewatcher: {e}"));
            }
        }
    }

    fn notify(&self, value: &Arc<T>) {
        if let Some(on_update) = &self.on_update {
            if let Err(panic) = call_guarded(|| on_update(value)) {
                tracing::warn!("[filewatcher] update hook failed: {panic}");
                self.logger.log(&format!("filewatcher: update hook failed: {panic}"));
            }
        }
    }

    fn poll(&mut self) {
        if fingerprint(&self.path) != self.fingerprint {
            crate::debug_event!("filewatcher", "poll detected change", "{}", self.path.display());
            self.reload();
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn reload_loop<T>(
    source: EventSource,
    mut reloader: Reloader<T>,
    poll_interval: Option<Duration>,
    cancel: CancellationToken,
) {
    let EventSource {
        watcher,
        mut events,
        mut errors,
    } = source;

    let mut ticker = poll_interval.map(|every| {
        let mut t = interval(every);
        t.set_missed_tick_behavior(MissedTickBehavior::Skip);
        t
    });

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                drop(watcher);
                crate::debug_event!("filewatcher", "stopped", "{}", reloader.path.display());
                return;
            }

            Some(e) = errors.recv() => {
                let err = WatchError::EventError { details: e.to_string() };
                tracing::warn!("[filewatcher] {err}");
                reloader.logger.log(&format!("filewatcher: {err}"));
            }

            Some(event) = events.recv() => {
                let changed = classify(&event)
                    .iter()
                    .any(|ev| reloader.concerns(ev.path(), ev.action()));
                if changed {
                    reloader.reload();
                }
            }

            _ = tick(&mut ticker) => reloader.poll(),
        }
    }
}
