//! Error sink for failures a running watcher recovers from.

use std::sync::Arc;

/// Receives human-readable messages for non-fatal watcher errors.
///
/// Raw event-source errors, handler failures and re-parse failures are all
/// reported here; none of them stop the watcher.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
}

/// Shared logger handle passed into watchers.
pub type SharedLogger = Arc<dyn Logger>;

/// Forwards messages to `tracing` at error level.
///
/// Silent when the process installs no subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::error!(target: "secretwatch", "{message}");
    }
}

/// Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn log(&self, _message: &str) {}
}

impl<F> Logger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// The logger used when none is configured: a [`NopLogger`]. Watchers still
/// emit their own `tracing` warnings, so pass [`TracingLogger`] only to have
/// the messages at error level under the `secretwatch` target.
pub fn default_logger() -> SharedLogger {
    Arc::new(NopLogger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_closure_logger_receives_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let logger: SharedLogger = Arc::new(move |msg: &str| sink.lock().push(msg.to_string()));

        logger.log("directorywatcher: watcher error: boom");
        NopLogger.log("dropped");

        assert_eq!(
            seen.lock().as_slice(),
            ["directorywatcher: watcher error: boom".to_string()]
        );
    }
}
