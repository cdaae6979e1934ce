//! Filesystem-driven hot reload of secrets and parsed file snapshots.
//!
//! - [`watcher::DirectoryWatcher`] turns directory changes into create/remove
//!   callbacks.
//! - [`filewatcher::FileWatcher`] keeps the last good parse of a single file.
//! - [`secrets::Store`] serves secrets written by a Vault sidecar or CSI
//!   driver and runs middlewares whenever they change.

pub mod config;
pub mod filewatcher;
pub mod logging;
pub mod secrets;
pub mod watcher;

pub use config::{LoggingConfig, Settings, WatcherSettings};
pub use filewatcher::{FileWatchError, FileWatcher, FileWatcherConfig};
pub use secrets::{
    CsiStore, FileStore, Provider, SecretMiddleware, Secrets, SecretsConfig, SecretsError, Store,
    init_from_config,
};
pub use watcher::{
    BoxError, DirectoryWatcher, DirectoryWatcherConfig, Logger, NopLogger, SharedLogger,
    TracingLogger, WatchError,
};
