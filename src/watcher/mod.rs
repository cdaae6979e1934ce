//! Directory watching.
//!
//! A [`DirectoryWatcher`] subscribes to a directory through an
//! [`EventSource`] and turns raw notify events into `on_create` /
//! `on_remove` callbacks, one per affected file path.
//!
//! # Architecture
//!
//! ```text
//! notify::RecommendedWatcher
//!   - events channel ---+
//!   - errors channel ---+--> watch loop (select) --> classify --> on_create / on_remove
//! CancellationToken ----+                                   \--> Logger (errors)
//! ```

mod directory;
mod error;
mod event;
mod logger;
mod source;

use std::panic::{AssertUnwindSafe, catch_unwind};

pub use directory::{DirectoryWatcher, DirectoryWatcherConfig, OnCreate, OnRemove};
pub use error::{BoxError, WatchError, WatchResult};
pub use event::{FsAction, FsEvent, classify};
pub use logger::{Logger, NopLogger, SharedLogger, TracingLogger, default_logger};
pub use source::EventSource;

/// Run a user callback, turning a panic into an error message.
///
/// Keeps a misbehaving callback from taking down a watcher's background task.
pub(crate) fn call_guarded<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        format!("callback panicked: {msg}")
    })
}
