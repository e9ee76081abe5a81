//! # Assessment Lifecycle
//!
//! Aggregates independent assessor sign-offs into a single conclusion that
//! gates the owning process.
//!
//! ## States
//!
//! ```text
//! AwaitingAssessors ──(last assessor signs)──▶ AwaitingApplicant ──(applicant confirms)──▶ Complete
//!        ▲                                                                                   │
//!        └──────────────────────────────── reassess ◀────────────────────────────────────────┘
//! ```
//!
//! The assessor set is fixed when the assessment is created. Every named
//! assessor must sign (N-of-N quorum) before the applicant can confirm.
//! Re-signing overwrites the earlier signature and never counts twice.
//!
//! The conclusion stays `Pending` until the assessment is complete. Once set
//! to `SuggestAuthorize` or `Failed` it is frozen until the next reassessment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use certflow_core::{AssessmentId, ProcessId, Timestamp, UserId};

// ─── Status ──────────────────────────────────────────────────────────

/// Lifecycle status of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    /// Waiting for one or more assessor signatures.
    AwaitingAssessors,
    /// All assessors signed; waiting for the applicant's confirmation.
    AwaitingApplicant,
    /// Every assessor and the applicant have signed.
    Complete,
}

impl AssessmentStatus {
    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingAssessors => "awaiting_assessors",
            Self::AwaitingApplicant => "awaiting_applicant",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    /// The panel recommends authorisation; the process takes its approve path.
    SuggestAuthorize,
    /// The applicant failed; the process takes its reject path.
    Failed,
    /// No conclusion recorded yet.
    Pending,
}

impl Conclusion {
    /// Return the string representation of this conclusion.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuggestAuthorize => "suggest_authorize",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by assessment operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssessmentError {
    /// The signer is not one of the assessors fixed at creation.
    #[error("{assessor_id} is not an assessor of assessment {assessment_id}")]
    UnknownAssessor {
        /// The assessment.
        assessment_id: AssessmentId,
        /// The rejected signer.
        assessor_id: UserId,
    },

    /// The operation is not allowed in the assessment's current status.
    #[error("cannot {operation} assessment {assessment_id} in status {status}")]
    InvalidState {
        /// The assessment.
        assessment_id: AssessmentId,
        /// The attempted operation.
        operation: &'static str,
        /// The current status.
        status: AssessmentStatus,
    },

    /// An assessment needs at least one assessor.
    #[error("assessment requires at least one assessor")]
    EmptyAssessorSet,

    /// Signature payloads must carry content.
    #[error("signature payload must not be empty")]
    EmptySignature,

    /// `Pending` cannot be recorded as a conclusion, and a recorded
    /// conclusion cannot be overwritten.
    #[error("cannot record conclusion {requested} on assessment {assessment_id} (current: {current})")]
    InvalidConclusion {
        /// The assessment.
        assessment_id: AssessmentId,
        /// The requested conclusion.
        requested: Conclusion,
        /// The current conclusion.
        current: Conclusion,
    },
}

// ─── Records ─────────────────────────────────────────────────────────

/// A recorded signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// The opaque signature payload (image data URI, typed name, ...).
    pub payload: String,
    /// When the signature was recorded.
    pub signed_at: Timestamp,
}

impl Signature {
    fn new(payload: String) -> Result<Self, AssessmentError> {
        if payload.trim().is_empty() {
            return Err(AssessmentError::EmptySignature);
        }
        Ok(Self {
            payload,
            signed_at: Timestamp::now(),
        })
    }
}

/// Free-form evaluation written by the panel before signing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Date the assessment took place.
    pub assessment_date: Option<String>,
    /// Assessment form (interview, practical, written).
    pub form: Option<String>,
    /// What was assessed.
    pub content: String,
    /// The panel's evaluation.
    pub evaluation: String,
    /// Written exam score, if any.
    pub written_score: Option<String>,
    /// Suggestions for the applicant.
    pub improvement_suggestions: String,
}

/// A multi-assessor sign-off record, 1:1 with its owning process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    /// Assessment identifier.
    pub id: AssessmentId,
    /// The owning process.
    pub process_id: ProcessId,
    /// Assessors whose signatures form the quorum, in the order given.
    pub assessor_ids: Vec<UserId>,
    /// Collected assessor signatures.
    pub signatures: BTreeMap<UserId, Signature>,
    /// The applicant's confirmation signature.
    pub applicant_signature: Option<Signature>,
    /// Current status.
    pub status: AssessmentStatus,
    /// Current conclusion.
    pub conclusion: Conclusion,
    /// Evaluation text recorded by the panel.
    pub evaluation: Evaluation,
    /// Assessment round: 1 for the first panel, incremented by every reset.
    pub round: u32,
    /// When the assessment was created.
    pub created_at: Timestamp,
    /// When the assessment last changed.
    pub updated_at: Timestamp,
}

impl Assessment {
    /// Create an assessment awaiting signatures from `assessor_ids`.
    ///
    /// Duplicate assessor ids are collapsed; order of first appearance is kept.
    pub fn new(
        process_id: ProcessId,
        assessor_ids: impl IntoIterator<Item = UserId>,
    ) -> Result<Self, AssessmentError> {
        let assessor_ids = dedup(assessor_ids)?;
        let now = Timestamp::now();
        Ok(Self {
            id: AssessmentId::new(),
            process_id,
            assessor_ids,
            signatures: BTreeMap::new(),
            applicant_signature: None,
            status: AssessmentStatus::AwaitingAssessors,
            conclusion: Conclusion::Pending,
            evaluation: Evaluation::default(),
            round: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Record (or overwrite) an assessor's signature and recompute status.
    pub fn sign(
        &mut self,
        assessor_id: &UserId,
        payload: impl Into<String>,
    ) -> Result<AssessmentStatus, AssessmentError> {
        if self.status == AssessmentStatus::Complete {
            return Err(self.invalid_state("sign"));
        }
        if !self.assessor_ids.contains(assessor_id) {
            return Err(AssessmentError::UnknownAssessor {
                assessment_id: self.id,
                assessor_id: assessor_id.clone(),
            });
        }
        let signature = Signature::new(payload.into())?;
        self.signatures.insert(assessor_id.clone(), signature);
        self.status = if self.is_fully_signed() {
            AssessmentStatus::AwaitingApplicant
        } else {
            AssessmentStatus::AwaitingAssessors
        };
        self.touch();
        Ok(self.status)
    }

    /// Record the applicant's confirmation (AWAITING_APPLICANT → COMPLETE).
    pub fn confirm_by_applicant(
        &mut self,
        payload: impl Into<String>,
    ) -> Result<(), AssessmentError> {
        self.require_status(AssessmentStatus::AwaitingApplicant, "confirm")?;
        self.applicant_signature = Some(Signature::new(payload.into())?);
        self.status = AssessmentStatus::Complete;
        self.touch();
        Ok(())
    }

    /// Record the conclusion of a complete assessment.
    pub fn set_conclusion(&mut self, conclusion: Conclusion) -> Result<(), AssessmentError> {
        self.require_status(AssessmentStatus::Complete, "conclude")?;
        if conclusion == Conclusion::Pending || self.conclusion != Conclusion::Pending {
            return Err(AssessmentError::InvalidConclusion {
                assessment_id: self.id,
                requested: conclusion,
                current: self.conclusion,
            });
        }
        self.conclusion = conclusion;
        self.touch();
        Ok(())
    }

    /// Record the panel's evaluation. Only allowed before the quorum is reached.
    pub fn record_evaluation(&mut self, evaluation: Evaluation) -> Result<(), AssessmentError> {
        self.require_status(AssessmentStatus::AwaitingAssessors, "record evaluation on")?;
        self.evaluation = evaluation;
        self.touch();
        Ok(())
    }

    /// Reset the assessment with a new panel.
    ///
    /// Clears every signature, the evaluation and the conclusion regardless
    /// of the current status.
    pub fn reassess(
        &mut self,
        new_assessor_ids: impl IntoIterator<Item = UserId>,
    ) -> Result<(), AssessmentError> {
        self.assessor_ids = dedup(new_assessor_ids)?;
        self.signatures.clear();
        self.applicant_signature = None;
        self.evaluation = Evaluation::default();
        self.status = AssessmentStatus::AwaitingAssessors;
        self.conclusion = Conclusion::Pending;
        self.round += 1;
        self.touch();
        Ok(())
    }

    /// Number of named assessors who have signed.
    pub fn signed_count(&self) -> usize {
        self.assessor_ids
            .iter()
            .filter(|id| self.signatures.contains_key(*id))
            .count()
    }

    /// Whether every named assessor has signed.
    pub fn is_fully_signed(&self) -> bool {
        self.signed_count() == self.assessor_ids.len()
    }

    /// Assessors who have not signed yet.
    pub fn missing_signatures(&self) -> Vec<&UserId> {
        self.assessor_ids
            .iter()
            .filter(|id| !self.signatures.contains_key(*id))
            .collect()
    }

    /// Whether `user_id` sits on the panel.
    pub fn has_assessor(&self, user_id: &UserId) -> bool {
        self.assessor_ids.contains(user_id)
    }

    fn require_status(
        &self,
        expected: AssessmentStatus,
        operation: &'static str,
    ) -> Result<(), AssessmentError> {
        if self.status != expected {
            return Err(self.invalid_state(operation));
        }
        Ok(())
    }

    fn invalid_state(&self, operation: &'static str) -> AssessmentError {
        AssessmentError::InvalidState {
            assessment_id: self.id,
            operation,
            status: self.status,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

fn dedup(ids: impl IntoIterator<Item = UserId>) -> Result<Vec<UserId>, AssessmentError> {
    let mut out: Vec<UserId> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    if out.is_empty() {
        return Err(AssessmentError::EmptyAssessorSet);
    }
    Ok(out)
}

// ─── Tests ───────────────────────────────────────────────────────────
