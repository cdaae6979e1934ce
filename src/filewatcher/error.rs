use std::path::PathBuf;
use thiserror::Error;

use crate::watcher::WatchError;

/// Errors from [`FileWatcher`](super::FileWatcher) construction and reloads.
#[derive(Error, Debug)]
pub enum FileWatchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("{path} is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("cancelled while waiting for {path}")]
    Cancelled { path: PathBuf },
}

pub type FileWatchResult<T> = Result<T, FileWatchError>;
