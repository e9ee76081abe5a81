//! # Certificate Record
//!
//! A certificate is immutable once issued. The only changes it admits are
//! status changes:
//!
//! ```text
//! valid ──(now ≥ expire_at)──▶ expired     computed at read time
//!   │
//!   └──revoke──▶ revoked                    stored, one-way
//! ```
//!
//! Expiry is never written. [`Certificate::status_at`] derives it from the
//! clock, so a stored record cannot disagree with the time.

use serde::{Deserialize, Serialize};

use certflow_core::{CertificateId, ContentDigest, ProcessId, TemplateId, Timestamp, UserId};
use certflow_state::WorkflowKind;

use crate::error::CertificateError;

/// Status of a certificate at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    /// Issued, not expired, not revoked.
    Valid,
    /// Past its expiry.
    Expired,
    /// Withdrawn administratively.
    Revoked,
}

impl CertificateStatus {
    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why and when a certificate was revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    /// Free-text reason.
    pub reason: String,
    /// When it was revoked.
    pub revoked_at: Timestamp,
}

/// An issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Identifier.
    pub id: CertificateId,
    /// Human-facing number, `<PREFIX>-<YEAR>-<NNN>`.
    pub number: String,
    /// The completed process this certificate proves.
    pub process_id: ProcessId,
    /// Workflow family of that process.
    pub kind: WorkflowKind,
    /// The holder.
    pub recipient_id: UserId,
    /// The holder's display name at issuance.
    pub recipient_name: String,
    /// Department of the process.
    pub department: String,
    /// The MTA, position or work covered.
    pub subject_id: String,
    /// Display name of the subject at issuance.
    pub subject_name: String,
    /// Template the content was rendered from.
    pub template_id: TemplateId,
    /// Template display name at issuance.
    pub template_name: String,
    /// Issue time.
    pub issued_at: Timestamp,
    /// Expiry time.
    pub expire_at: Timestamp,
    /// Rendered text.
    pub content: String,
    /// SHA-256 of `content`, fixed at issuance.
    pub content_digest: ContentDigest,
    /// Set once revoked.
    #[serde(default)]
    pub revocation: Option<Revocation>,
}

impl Certificate {
    /// Status at `now`.
    pub fn status_at(&self, now: Timestamp) -> CertificateStatus {
        if self.revocation.is_some() {
            CertificateStatus::Revoked
        } else if now >= self.expire_at {
            CertificateStatus::Expired
        } else {
            CertificateStatus::Valid
        }
    }

    /// Status at the current time.
    pub fn status(&self) -> CertificateStatus {
        self.status_at(Timestamp::now())
    }

    /// Revoke at `now`. Only a valid certificate can be revoked.
    pub fn revoke(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), CertificateError> {
        match self.status_at(now) {
            CertificateStatus::Valid => {
                self.revocation = Some(Revocation {
                    reason: reason.into(),
                    revoked_at: now,
                });
                Ok(())
            }
            CertificateStatus::Revoked => Err(CertificateError::AlreadyRevoked {
                certificate_id: self.id,
            }),
            status @ CertificateStatus::Expired => Err(CertificateError::NotValid {
                certificate_id: self.id,
                status,
            }),
        }
    }

    /// Whether `content` still matches the digest taken at issuance.
    pub fn verify_content(&self) -> bool {
        self.content_digest.matches(self.content.as_bytes())
    }
}
