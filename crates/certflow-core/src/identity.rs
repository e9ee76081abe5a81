//! # Identity Newtypes
//!
//! Newtype wrappers for every identifier the workflow engine handles.
//! Engine-owned records (processes, assessments, certificates) get random
//! UUIDs. Users and templates are owned by external systems, so their
//! identifiers are opaque strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CertflowError;

/// Unique identifier for a workflow process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub Uuid);

/// Unique identifier for an assessment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentId(pub Uuid);

/// Unique identifier for an issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(pub Uuid);

/// Identifier of a user in the external user directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Identifier of a certificate template owned by the template collaborator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

macro_rules! uuid_id {
    ($ty:ident, $prefix:literal) => {
        impl $ty {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(ProcessId, "process");
uuid_id!(AssessmentId, "assessment");
uuid_id!(CertificateId, "certificate");

macro_rules! string_id {
    ($ty:ident, $what:literal) => {
        impl $ty {
            /// Create an identifier, rejecting empty or whitespace-only input.
            pub fn new(raw: impl Into<String>) -> Result<Self, CertflowError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(CertflowError::InvalidIdentifier(
                        concat!($what, " must not be empty").to_string(),
                    ));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(UserId, "user id");
string_id!(TemplateId, "template id");
