//! Secret value types and the on-disk document format.
//!
//! The bundle written by the Vault fetcher sidecar looks like:
//!
//! ```json
//! {
//!   "secrets": {
//!     "secret/svc/api-key": {"type": "simple", "value": "...", "encoding": "identity"},
//!     "secret/svc/signing": {"type": "versioned", "current": "...", "previous": "...", "encoding": "base64"},
//!     "secret/svc/db": {"type": "credential", "username": "...", "password": "..."}
//!   },
//!   "vault": {"url": "https://vault:8200/", "token": "..."}
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::error::{SecretsError, SecretsResult};

/// Secret bytes. `Debug` never prints the value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The value as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl From<Vec<u8>> for Secret {
    fn from(bytes: Vec<u8>) -> Self {
        Secret(bytes)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Secret(s.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleSecret {
    pub value: Secret,
}

/// A secret under rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSecret {
    pub current: Secret,
    pub previous: Option<Secret>,
    pub next: Option<Secret>,
}

impl VersionedSecret {
    /// Every version that is present: current, then previous, then next.
    ///
    /// Useful for validating signatures made with any live version.
    pub fn all(&self) -> Vec<&Secret> {
        std::iter::once(&self.current)
            .chain(self.previous.as_ref())
            .chain(self.next.as_ref())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSecret {
    pub username: String,
    pub password: Secret,
}

/// Connection info for talking to Vault directly.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("url", &self.url)
            .field("token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretKind {
    Simple,
    Versioned,
    Credential,
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecretKind::Simple => "simple",
            SecretKind::Versioned => "versioned",
            SecretKind::Credential => "credential",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SecretEntry {
    Simple(SimpleSecret),
    Versioned(VersionedSecret),
    Credential(CredentialSecret),
}

impl SecretEntry {
    fn kind(&self) -> SecretKind {
        match self {
            SecretEntry::Simple(_) => SecretKind::Simple,
            SecretEntry::Versioned(_) => SecretKind::Versioned,
            SecretEntry::Credential(_) => SecretKind::Credential,
        }
    }
}

/// One secret as it appears on disk, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawSecret {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    previous: Option<String>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Identity,
    Base64,
}

impl Encoding {
    fn parse(path: &str, encoding: Option<&str>) -> SecretsResult<Self> {
        match encoding {
            None | Some("") | Some("identity") => Ok(Encoding::Identity),
            Some("base64") => Ok(Encoding::Base64),
            Some(other) => Err(SecretsError::Invalid {
                path: path.to_string(),
                reason: format!("unknown encoding {other:?}"),
            }),
        }
    }

    fn decode(self, path: &str, value: &str) -> SecretsResult<Secret> {
        match self {
            Encoding::Identity => Ok(Secret::from(value)),
            Encoding::Base64 => STANDARD
                .decode(value)
                .map(Secret::from)
                .map_err(|e| SecretsError::Encoding {
                    path: path.to_string(),
                    encoding: "base64".to_string(),
                    reason: e.to_string(),
                }),
        }
    }
}

impl RawSecret {
    /// Validate and decode into a typed entry.
    pub(crate) fn into_entry(self, path: &str) -> SecretsResult<SecretEntry> {
        let invalid = |reason: &str| SecretsError::Invalid {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        let encoding = Encoding::parse(path, self.encoding.as_deref())?;

        match self.kind.as_str() {
            "simple" => {
                let value = self
                    .value
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| invalid("simple secret has no value"))?;
                Ok(SecretEntry::Simple(SimpleSecret {
                    value: encoding.decode(path, &value)?,
                }))
            }
            "versioned" => {
                let current = self
                    .current
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| invalid("versioned secret has no current value"))?;
                let decode_opt = |v: Option<String>| -> SecretsResult<Option<Secret>> {
                    v.filter(|v| !v.is_empty())
                        .map(|v| encoding.decode(path, &v))
                        .transpose()
                };
                Ok(SecretEntry::Versioned(VersionedSecret {
                    current: encoding.decode(path, &current)?,
                    previous: decode_opt(self.previous)?,
                    next: decode_opt(self.next)?,
                }))
            }
            "credential" => {
                if encoding != Encoding::Identity {
                    return Err(invalid("credential secrets must use identity encoding"));
                }
                let username = self
                    .username
                    .ok_or_else(|| invalid("credential secret has no username"))?;
                let password = self
                    .password
                    .ok_or_else(|| invalid("credential secret has no password"))?;
                Ok(SecretEntry::Credential(CredentialSecret {
                    username,
                    password: Secret::from(password.as_str()),
                }))
            }
            "" => Err(invalid("secret has no type")),
            other => Err(invalid(&format!("unknown secret type {other:?}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    secrets: HashMap<String, RawSecret>,
    #[serde(default)]
    vault: Vault,
}

/// A parsed, validated snapshot of every secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    entries: HashMap<String, SecretEntry>,
    vault: Vault,
}

impl Secrets {
    /// Parse a secrets document.
    pub fn from_json(bytes: &[u8]) -> SecretsResult<Self> {
        let doc: Document = serde_json::from_slice(bytes)?;
        Self::from_document(doc)
    }

    fn from_document(doc: Document) -> SecretsResult<Self> {
        let entries = doc
            .secrets
            .into_iter()
            .map(|(path, raw)| raw.into_entry(&path).map(|entry| (path, entry)))
            .collect::<SecretsResult<HashMap<_, _>>>()?;

        Ok(Self {
            entries,
            vault: doc.vault,
        })
    }

    pub(crate) fn from_entries(entries: HashMap<String, SecretEntry>, vault: Vault) -> Self {
        Self { entries, vault }
    }

    fn entry(&self, path: &str) -> SecretsResult<&SecretEntry> {
        self.entries.get(path).ok_or_else(|| SecretsError::NotFound {
            path: path.to_string(),
        })
    }

    pub fn get_simple_secret(&self, path: &str) -> SecretsResult<SimpleSecret> {
        match self.entry(path)? {
            SecretEntry::Simple(s) => Ok(s.clone()),
            other => Err(wrong_type(path, other, SecretKind::Simple)),
        }
    }

    pub fn get_versioned_secret(&self, path: &str) -> SecretsResult<VersionedSecret> {
        match self.entry(path)? {
            SecretEntry::Versioned(s) => Ok(s.clone()),
            other => Err(wrong_type(path, other, SecretKind::Versioned)),
        }
    }

    pub fn get_credential_secret(&self, path: &str) -> SecretsResult<CredentialSecret> {
        match self.entry(path)? {
            SecretEntry::Credential(s) => Ok(s.clone()),
            other => Err(wrong_type(path, other, SecretKind::Credential)),
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// The declared type of a secret, if present.
    pub fn kind_of(&self, path: &str) -> Option<SecretKind> {
        self.entries.get(path).map(SecretEntry::kind)
    }

    /// All secret ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn wrong_type(path: &str, entry: &SecretEntry, expected: SecretKind) -> SecretsError {
    SecretsError::WrongType {
        path: path.to_string(),
        declared: entry.kind(),
        expected,
    }
}
