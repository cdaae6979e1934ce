//! Error types for the directory watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by user-supplied callbacks and parsers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from watcher operations.
///
/// Only `InitFailed` and `PathWatchFailed` are ever returned to callers.
/// The other variants describe failures discovered by a running watcher;
/// they are formatted and handed to the [`Logger`](super::Logger).
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("watcher error: {details}")]
    EventError { details: String },

    #[error("{handler} handler error for {path}: {reason}")]
    HandlerFailed {
        handler: String,
        path: PathBuf,
        reason: String,
    },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
