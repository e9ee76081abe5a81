//! # Stored Schema Migration
//!
//! Every table is saved inside a versioned envelope:
//!
//! ```json
//! { "schema_version": 1, "records": [ ... ] }
//! ```
//!
//! A bare JSON array is the unversioned (v0) layout. It is migrated once, at
//! load, record by record, into the current shape; the next save writes the
//! envelope. Migration functions take a raw record and return one that
//! deserializes into the current type with every field populated.
//!
//! v0 differences handled here:
//!
//! - processes used `owner_user_id`, `workflow_kind` and `stage_history`,
//!   and had no `status`, `revision` or `updated_at`;
//! - assessments stored signatures as bare payload strings (or `null` for
//!   absent ones) and had no `round`, `evaluation` or `updated_at`;
//! - certificates used `certificate_number`, stored `status` directly, and
//!   had no content digest;
//! - templates could lack an id, a variable list, or a positive validity.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use certflow_assessment::Assessment;
use certflow_cert::{template, Certificate, Template, DEFAULT_EXPIRE_YEARS};
use certflow_core::sha256_digest;
use certflow_state::{Process, ProcessStatus, Stage};

/// The layout written by this version.
pub const SCHEMA_VERSION: u32 = 1;

/// A stored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Layout version of `records`.
    pub schema_version: u32,
    /// The records.
    pub records: Vec<T>,
}

impl<T> Envelope<T> {
    /// Wrap records in the current layout.
    pub fn current(records: Vec<T>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            records,
        }
    }
}

/// Errors raised while decoding a stored table.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The table was written by a newer version.
    #[error("key {key:?} has schema version {found}; this build reads up to {SCHEMA_VERSION}")]
    UnsupportedVersion {
        /// The key.
        key: String,
        /// The stored version.
        found: u64,
    },

    /// The document is neither an envelope nor a bare array.
    #[error("key {key:?} holds an unrecognised document")]
    UnrecognisedLayout {
        /// The key.
        key: String,
    },

    /// A record does not match the expected shape.
    #[error("key {key:?} record {index}: {source}")]
    Record {
        /// The key.
        key: String,
        /// Position of the record in the table.
        index: usize,
        /// Underlying error.
        source: serde_json::Error,
    },
}

type RecordMigration = fn(Map<String, Value>) -> Map<String, Value>;

/// Decode a stored table, migrating v0 records through `migrate_v0`.
fn decode<T: DeserializeOwned>(
    key: &str,
    doc: Value,
    migrate_v0: RecordMigration,
) -> Result<Vec<T>, MigrationError> {
    let (records, migrate) = match doc {
        Value::Array(records) => (records, true),
        Value::Object(mut envelope) => {
            let version = envelope.get("schema_version").and_then(Value::as_u64);
            match version {
                Some(v) if v == u64::from(SCHEMA_VERSION) => {}
                Some(found) => {
                    return Err(MigrationError::UnsupportedVersion {
                        key: key.to_string(),
                        found,
                    })
                }
                None => {
                    return Err(MigrationError::UnrecognisedLayout {
                        key: key.to_string(),
                    })
                }
            }
            match envelope.remove("records") {
                Some(Value::Array(records)) => (records, false),
                _ => {
                    return Err(MigrationError::UnrecognisedLayout {
                        key: key.to_string(),
                    })
                }
            }
        }
        _ => {
            return Err(MigrationError::UnrecognisedLayout {
                key: key.to_string(),
            })
        }
    };
    if migrate {
        tracing::info!(key, records = records.len(), "migrating unversioned table");
    }
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let record = match (migrate, record) {
                (true, Value::Object(map)) => Value::Object(migrate_v0(map)),
                (_, other) => other,
            };
            serde_json::from_value(record).map_err(|source| MigrationError::Record {
                key: key.to_string(),
                index,
                source,
            })
        })
        .collect()
}

/// Decode a processes table.
pub fn decode_processes(key: &str, doc: Value) -> Result<Vec<Process>, MigrationError> {
    decode(key, doc, migrate_process_v0)
}

/// Decode the assessments table.
pub fn decode_assessments(key: &str, doc: Value) -> Result<Vec<Assessment>, MigrationError> {
    decode(key, doc, migrate_assessment_v0)
}

/// Decode the certificates table.
pub fn decode_certificates(key: &str, doc: Value) -> Result<Vec<Certificate>, MigrationError> {
    decode(key, doc, migrate_certificate_v0)
}

/// Decode a template list.
pub fn decode_templates(key: &str, doc: Value) -> Result<Vec<Template>, MigrationError> {
    decode(key, doc, migrate_template_v0)
}

fn rename(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(v) = map.remove(from) {
        map.entry(to.to_string()).or_insert(v);
    }
}

fn default_from(map: &mut Map<String, Value>, field: &str, source: &str) {
    if !map.contains_key(field) {
        if let Some(v) = map.get(source).cloned() {
            map.insert(field.to_string(), v);
        }
    }
}

fn migrate_process_v0(mut map: Map<String, Value>) -> Map<String, Value> {
    rename(&mut map, "owner_user_id", "owner_id");
    rename(&mut map, "workflow_kind", "kind");
    rename(&mut map, "stage_history", "history");
    default_from(&mut map, "updated_at", "created_at");
    if !map.contains_key("status") {
        let stage = map
            .get("current_stage")
            .cloned()
            .and_then(|v| serde_json::from_value::<Stage>(v).ok());
        if let Some(stage) = stage {
            map.insert("status".to_string(), json!(ProcessStatus::of(stage)));
        }
    }
    if !map.contains_key("revision") {
        let transitions = map.get("history").and_then(Value::as_array).map_or(0, Vec::len);
        map.insert("revision".to_string(), json!(transitions));
    }
    map
}

fn migrate_assessment_v0(mut map: Map<String, Value>) -> Map<String, Value> {
    default_from(&mut map, "updated_at", "created_at");
    let signed_at = map.get("created_at").cloned().unwrap_or(Value::Null);
    let signatures = match map.remove("signatures") {
        Some(Value::Object(raw)) => raw
            .into_iter()
            .filter_map(|(assessor, sig)| match sig {
                Value::String(payload) if !payload.trim().is_empty() => Some((
                    assessor,
                    json!({ "payload": payload, "signed_at": signed_at.clone() }),
                )),
                Value::Object(obj) => Some((assessor, Value::Object(obj))),
                _ => None,
            })
            .collect(),
        _ => Map::new(),
    };
    map.insert("signatures".to_string(), Value::Object(signatures));
    if let Some(Value::String(payload)) = map.get("applicant_signature").cloned() {
        let sig = if payload.trim().is_empty() {
            Value::Null
        } else {
            json!({ "payload": payload, "signed_at": signed_at.clone() })
        };
        map.insert("applicant_signature".to_string(), sig);
    }
    map.entry("applicant_signature").or_insert(Value::Null);
    map.entry("round").or_insert(json!(1));
    map.entry("evaluation").or_insert_with(|| {
        json!({
            "assessment_date": null,
            "form": null,
            "content": "",
            "evaluation": "",
            "written_score": null,
            "improvement_suggestions": ""
        })
    });
    map
}

fn migrate_certificate_v0(mut map: Map<String, Value>) -> Map<String, Value> {
    rename(&mut map, "certificate_number", "number");
    rename(&mut map, "certificate_template_id", "template_id");
    rename(&mut map, "certificate_template_name", "template_name");
    rename(&mut map, "applicant_id", "recipient_id");
    rename(&mut map, "applicant_name", "recipient_name");
    let status = map.remove("status");
    if status.as_ref().and_then(Value::as_str) == Some("revoked") && !map.contains_key("revocation") {
        let revoked_at = map
            .get("updated_at")
            .or_else(|| map.get("issued_at"))
            .cloned()
            .unwrap_or(Value::Null);
        map.insert(
            "revocation".to_string(),
            json!({ "reason": "", "revoked_at": revoked_at }),
        );
    }
    map.remove("updated_at");
    if !map.contains_key("content_digest") {
        let content = map.get("content").and_then(Value::as_str).unwrap_or_default();
        map.insert(
            "content_digest".to_string(),
            json!(sha256_digest(content.as_bytes())),
        );
    }
    map
}

fn migrate_template_v0(mut map: Map<String, Value>) -> Map<String, Value> {
    let has_id = map
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    if !has_id {
        // Stable across reloads until the next save writes the id back.
        let seed = serde_json::to_vec(&map).unwrap_or_default();
        let id = format!("ct_{}", &sha256_digest(&seed).to_hex()[..12]);
        map.insert("id".to_string(), json!(id));
    }
    rename(&mut map, "content", "content_template");
    map.entry("name").or_insert(json!(""));
    if !map.get("variables").is_some_and(Value::is_array) {
        map.insert("variables".to_string(), json!(template::default_variables()));
    }
    let years = map.get("default_expire_years").and_then(Value::as_u64).unwrap_or(0);
    if years == 0 {
        map.insert("default_expire_years".to_string(), json!(DEFAULT_EXPIRE_YEARS));
    }
    map
}
