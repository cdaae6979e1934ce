use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::filewatcher::FileWatchError;
use crate::watcher::WatchError;

use super::types::SecretKind;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("secret {path} not found")]
    NotFound { path: String },

    #[error("secret {path} is {declared}, expected {expected}")]
    WrongType {
        path: String,
        declared: SecretKind,
        expected: SecretKind,
    },

    #[error("invalid secret {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("secret {path} has bad {encoding} encoding: {reason}")]
    Encoding {
        path: String,
        encoding: String,
        reason: String,
    },

    #[error("malformed secrets document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown secret provider {provider}, must be one of ['vault', 'vault_csi']")]
    UnknownProvider { provider: String },

    #[error("secrets path is required")]
    MissingPath,

    #[error("{operation} is not supported by the {provider} provider")]
    Unsupported {
        operation: &'static str,
        provider: &'static str,
    },

    #[error("{path} did not become available within {timeout:?}")]
    DeadlineExceeded { path: PathBuf, timeout: Duration },

    #[error(transparent)]
    FileWatch(#[from] FileWatchError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SecretsResult<T> = Result<T, SecretsError>;
