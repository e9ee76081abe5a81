//! # Key-Value Persistence
//!
//! The engine keeps its tables in memory and mirrors them into a
//! [`KeyValueStore`] after every mutation. One key holds one table:
//!
//! | Key | Contents |
//! |---|---|
//! | `processes.<kind>` | processes of one workflow kind |
//! | `assessments` | every assessment |
//! | `certificates` | every certificate |
//!
//! Saves are best-effort. A failed save never fails the operation that
//! triggered it; it is logged and, under [`PersistencePolicy::Record`], kept
//! as a [`PersistenceWarning`] the caller can drain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use certflow_core::Timestamp;
use certflow_state::WorkflowKind;

/// Key of the assessments table.
pub const ASSESSMENTS_KEY: &str = "assessments";
/// Key of the certificates table.
pub const CERTIFICATES_KEY: &str = "certificates";

/// Key of the processes table for `kind`.
pub fn processes_key(kind: WorkflowKind) -> String {
    format!("processes.{kind}")
}

/// Errors raised by a [`KeyValueStore`].
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("i/o error on key {key:?}: {source}")]
    Io {
        /// The key being read or written.
        key: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The stored bytes are not JSON.
    #[error("key {key:?} does not hold valid JSON: {source}")]
    Serialization {
        /// The key.
        key: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Keys may only contain ASCII letters, digits, `.`, `_` and `-`.
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}

/// An opaque durable map from key to JSON document.
pub trait KeyValueStore: Send + Sync {
    /// Read the document under `key`. `None` if nothing was saved yet.
    fn load(&self, key: &str) -> Result<Option<Value>, PersistenceError>;

    /// Replace the document under `key`.
    fn save(&self, key: &str, value: &Value) -> Result<(), PersistenceError>;
}

/// What to do with failed saves beyond logging them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistencePolicy {
    /// Log and forget.
    #[default]
    Ignore,
    /// Log and keep a [`PersistenceWarning`].
    Record,
}

impl std::str::FromStr for PersistencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "record" => Ok(Self::Record),
            other => Err(other.to_string()),
        }
    }
}

/// A save that did not reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceWarning {
    /// The key that was not saved.
    pub key: String,
    /// What went wrong.
    pub message: String,
    /// When the save was attempted.
    pub at: Timestamp,
}

// ─── In-Memory Store ─────────────────────────────────────────────────

/// A [`KeyValueStore`] that lives in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys saved so far, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        self.data.write().insert(key.to_string(), value.clone());
        Ok(())
    }
}

// ─── JSON File Store ─────────────────────────────────────────────────

/// A [`KeyValueStore`] writing one pretty-printed JSON file per key.
///
/// A save writes `<key>.json.tmp` and renames it over `<key>.json`, so a
/// reader never sees a half-written document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| PersistenceError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// The directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        let path = self.path_for(key)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Serialization {
                key: key.to_string(),
                source,
            })?;
        let tmp = path.with_extension("json.tmp");
        let written = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, &path));
        if let Err(source) = written {
            // The previous document, if any, is untouched.
            std::fs::remove_file(&tmp).ok();
            return Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            });
        }
        tracing::debug!(key, path = %path.display(), "saved");
        Ok(())
    }
}
