//! Engine configuration.
//!
//! Loaded from the environment or from a YAML document. Every field has a
//! default, so an empty environment yields an in-memory engine that ignores
//! persistence failures.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::persistence::PersistencePolicy;

/// Environment variable naming the storage directory.
pub const STORAGE_DIR_ENV: &str = "CERTFLOW_STORAGE_DIR";
/// Environment variable selecting the persistence policy.
pub const PERSISTENCE_POLICY_ENV: &str = "CERTFLOW_PERSISTENCE_POLICY";
/// Environment variable switching logs to JSON.
pub const LOG_JSON_ENV: &str = "CERTFLOW_LOG_JSON";

/// Configuration for a [`WorkflowEngine`](crate::WorkflowEngine).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory for [`JsonFileStore`](crate::JsonFileStore). `None` keeps
    /// everything in memory.
    pub storage_dir: Option<PathBuf>,
    /// What to do with failed saves.
    pub persistence_policy: PersistencePolicy,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `CERTFLOW_STORAGE_DIR` (default: unset, in-memory)
    /// - `CERTFLOW_PERSISTENCE_POLICY`: `ignore` or `record` (default: `ignore`)
    /// - `CERTFLOW_LOG_JSON`: `true`/`false`/`1`/`0` (default: `false`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let storage_dir = lookup(STORAGE_DIR_ENV)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let persistence_policy = match lookup(PERSISTENCE_POLICY_ENV) {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue(PERSISTENCE_POLICY_ENV.to_string(), raw))?,
            None => PersistencePolicy::default(),
        };
        let log_json = match lookup(LOG_JSON_ENV) {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::InvalidValue(LOG_JSON_ENV.to_string(), raw))?,
            None => false,
        };
        Ok(Self {
            storage_dir,
            persistence_policy,
            log_json,
        })
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML configuration file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        Self::from_yaml_str(&raw)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(String, String),
    #[error("cannot read configuration file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
