//! Building a [`Store`] from configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::WatcherSettings;
use crate::watcher::SharedLogger;

use super::csi::CsiStore;
use super::error::{SecretsError, SecretsResult};
use super::middleware::SecretMiddleware;
use super::store::{FileStore, Store};

/// Default bound on how long store construction may wait for its source.
pub const DEFAULT_INIT_TIMEOUT_SECS: u64 = 30;

/// Where a store gets its secrets from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    /// One JSON bundle file written by the fetcher sidecar.
    #[default]
    Vault,
    /// A directory of per-secret files mounted by the CSI driver.
    VaultCsi,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Vault => "vault",
            Provider::VaultCsi => "vault_csi",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vault" => Ok(Provider::Vault),
            "vault_csi" => Ok(Provider::VaultCsi),
            other => Err(SecretsError::UnknownProvider {
                provider: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = SecretsError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Provider> for String {
    fn from(p: Provider) -> Self {
        p.as_str().to_string()
    }
}

/// The `[secrets]` section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Bundle file for `vault`, mount directory for `vault_csi`.
    #[serde(default)]
    pub path: PathBuf,

    #[serde(default)]
    pub provider: Provider,

    /// How long construction waits for the source to appear and parse.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
}

fn default_init_timeout_secs() -> u64 {
    DEFAULT_INIT_TIMEOUT_SECS
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            provider: Provider::default(),
            init_timeout_secs: DEFAULT_INIT_TIMEOUT_SECS,
        }
    }
}

impl SecretsConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }
}

/// Build the store selected by `config.provider`.
///
/// Construction is bounded by `config.init_timeout_secs`; if the source does
/// not appear and parse within that time this fails with
/// [`SecretsError::DeadlineExceeded`] and nothing keeps running.
pub async fn init_from_config(
    scope: &CancellationToken,
    config: &SecretsConfig,
    watcher: &WatcherSettings,
    logger: SharedLogger,
    middlewares: &[SecretMiddleware],
) -> SecretsResult<Arc<dyn Store>> {
    if config.path.as_os_str().is_empty() {
        return Err(SecretsError::MissingPath);
    }

    // Scoped so a timed-out construction leaves nothing running.
    let init = scope.child_token();
    let timeout = config.init_timeout();

    let build = async {
        let store: Arc<dyn Store> = match config.provider {
            Provider::Vault => Arc::new(
                FileStore::with_settings(&init, &config.path, logger, middlewares, watcher).await?,
            ),
            Provider::VaultCsi => Arc::new(
                CsiStore::with_settings(&init, &config.path, logger, middlewares, watcher).await?,
            ),
        };
        Ok::<_, SecretsError>(store)
    };

    match tokio::time::timeout(timeout, build).await {
        Ok(store) => {
            let store = store?;
            crate::log_event!(
                "secrets",
                "store ready",
                "{} ({})",
                config.path.display(),
                config.provider
            );
            Ok(store)
        }
        Err(_) => {
            init.cancel();
            Err(SecretsError::DeadlineExceeded {
                path: config.path.clone(),
                timeout,
            })
        }
    }
}
