//! Tracing subscriber for the `secretwatch` binary and embedding services.
//!
//! Library code only emits `tracing` events; nothing is printed until a
//! subscriber is installed. Events carry a `[component]` prefix so reloads
//! can be followed per subsystem:
//!
//! | component | emitted by |
//! |---|---|
//! | `directorywatcher` | create/remove dispatch and shutdown |
//! | `filewatcher` | snapshot loads and reload failures |
//! | `secrets` | store construction and CSI rescans |
//!
//! Levels come from the `[logging]` table of `secretwatch.toml`:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "secretwatch::secrets" = "debug"
//! ```
//!
//! A set `RUST_LOG` replaces the table entirely, e.g.
//! `RUST_LOG=secretwatch::filewatcher=trace secretwatch secrets --path bundle.json`.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Wall-clock `HH:MM:SS.mmm`; reload bursts are easier to read without dates.
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the `EnvFilter` directive string for `config`, e.g.
/// `warn,secretwatch::secrets=debug`.
fn directives(config: &LoggingConfig) -> String {
    config
        .modules
        .iter()
        .fold(config.default.clone(), |mut acc, (target, level)| {
            acc.push_str(&format!(",{target}={level}"));
            acc
        })
}

/// Install the process subscriber from the `[logging]` settings.
///
/// Only the first call in a process has an effect, and an already installed
/// global subscriber is left alone. Per-target levels in `config.modules`
/// are keyed by module path (`secretwatch::watcher`, `secretwatch::secrets`).
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

/// [`init_with_config`] with the default `warn` level.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("filewatcher", "reloaded", "{}", path.display());
/// log_event!("secrets", "store ready");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("directorywatcher", "remove", "{}", path.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_append_module_levels() {
        let mut config = LoggingConfig::default();
        assert_eq!(directives(&config), "warn");

        config
            .modules
            .insert("secretwatch::secrets".to_string(), "debug".to_string());
        assert_eq!(directives(&config), "warn,secretwatch::secrets=debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("secretwatch::watcher".to_string(), "debug".to_string());

        init_with_config(&config);
        init();
        crate::log_event!("logging", "initialized");
        crate::debug_event!("logging", "initialized", "{}", config.default);
    }
}
