//! Hot-reloading secrets.
//!
//! A [`Store`] keeps an in-memory [`Secrets`] snapshot in sync with what a
//! Vault sidecar or CSI driver writes to disk, and runs a chain of
//! [`SecretMiddleware`]s after each successful update.
//!
//! ```text
//! provider "vault"      bundle.json --FileWatcher<Secrets>--+
//!                                                           +--> snapshot --> middleware chain
//! provider "vault_csi"  mount/ --DirectoryWatcher + scan ---+
//! ```
//!
//! Readers never block and never see a partially applied update.

mod config;
mod csi;
mod error;
mod middleware;
mod store;
mod types;

pub use config::{DEFAULT_INIT_TIMEOUT_SECS, Provider, SecretsConfig, init_from_config};
pub use csi::CsiStore;
pub use error::{SecretsError, SecretsResult};
pub use middleware::{HandlerChain, SecretHandler, SecretMiddleware, middleware};
pub use store::{FileStore, Store};
pub use types::{
    CredentialSecret, Secret, SecretKind, Secrets, SimpleSecret, Vault, VersionedSecret,
};
