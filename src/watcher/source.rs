//! Raw event source over `notify`.
//!
//! Bridges the synchronous notify callback into two tokio channels, one for
//! events and one for errors, so a watcher loop can select over them.

use std::path::Path;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::error::{WatchError, WatchResult};

const CHANNEL_CAPACITY: usize = 100;

/// A notify subscription plus the channels it delivers into.
///
/// Dropping the source closes the subscription.
pub struct EventSource {
    pub(crate) watcher: RecommendedWatcher,
    pub(crate) events: mpsc::Receiver<Event>,
    pub(crate) errors: mpsc::Receiver<notify::Error>,
}

impl EventSource {
    /// Create an event source with no subscriptions.
    pub fn new() -> WatchResult<Self> {
        let (event_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, errors) = mpsc::channel(CHANNEL_CAPACITY);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Send failures mean the loop has exited and dropped its receivers.
            match res {
                Ok(event) => {
                    let _ = event_tx.blocking_send(event);
                }
                Err(e) => {
                    let _ = error_tx.blocking_send(e);
                }
            }
        })?;

        Ok(Self {
            watcher,
            events,
            errors,
        })
    }

    /// Subscribe to direct children of `path` (or to `path` itself if it is a file).
    pub fn subscribe(&mut self, path: &Path) -> WatchResult<()> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}
