//! # certflow-engine — Workflow Engine Service
//!
//! Wires the process state machine, the assessment sub-engine and
//! certificate issuance into one service:
//!
//! - [`engine`]: [`WorkflowEngine`], the operations a presentation layer
//!   calls.
//! - [`store`]: thread-safe in-memory record tables.
//! - [`persistence`]: the [`KeyValueStore`] seam with in-memory and JSON
//!   file backends. Saves are best-effort.
//! - [`migration`]: versioned envelopes and the upgrade of unversioned
//!   stored data.
//! - [`directory`]: read-only name and template lookups.
//! - [`config`] and [`telemetry`]: environment/YAML configuration and the
//!   tracing subscriber.

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod migration;
pub mod persistence;
pub mod store;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig};
pub use directory::{Directory, InMemoryDirectory, InMemoryTemplateCatalog, TemplateCatalog};
pub use engine::WorkflowEngine;
pub use error::EngineError;
pub use migration::{Envelope, MigrationError, SCHEMA_VERSION};
pub use persistence::{
    processes_key, JsonFileStore, KeyValueStore, MemoryStore, PersistenceError,
    PersistencePolicy, PersistenceWarning, ASSESSMENTS_KEY, CERTIFICATES_KEY,
};
pub use store::Store;
pub use telemetry::init_tracing;
