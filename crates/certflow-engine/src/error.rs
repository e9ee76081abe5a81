//! Engine error type.
//!
//! Wraps the per-crate errors of the state machine, the assessment
//! sub-engine and certificate issuance, and adds the lookups and
//! cross-record checks only the engine can make. Every variant is
//! recoverable; the caller reports it and carries on.

use thiserror::Error;

use certflow_assessment::{AssessmentError, AssessmentStatus, Conclusion};
use certflow_cert::CertificateError;
use certflow_core::{AssessmentId, CertificateId, ProcessId, TemplateId, UserId};
use certflow_state::{ProcessError, Stage};

use crate::migration::MigrationError;
use crate::persistence::PersistenceError;

/// Errors returned by [`WorkflowEngine`](crate::WorkflowEngine) operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// State machine rejection.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Assessment sub-engine rejection.
    #[error(transparent)]
    Assessment(#[from] AssessmentError),

    /// Issuance or revocation rejection.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// No such process.
    #[error("process {0} not found")]
    ProcessNotFound(ProcessId),

    /// No such assessment.
    #[error("assessment {0} not found")]
    AssessmentNotFound(AssessmentId),

    /// No such certificate.
    #[error("certificate {0} not found")]
    CertificateNotFound(CertificateId),

    /// No such template.
    #[error("template {0} not found")]
    TemplateNotFound(TemplateId),

    /// The process already has an assessment.
    #[error("process {process_id} already has assessment {assessment_id}")]
    AssessmentExists {
        /// The process.
        process_id: ProcessId,
        /// The existing assessment.
        assessment_id: AssessmentId,
    },

    /// The process cannot leave its assessment stage yet.
    #[error("process {process_id} is waiting on its assessment (status {status:?}, conclusion {conclusion:?})")]
    AssessmentPending {
        /// The process.
        process_id: ProcessId,
        /// Assessment status, if an assessment exists.
        status: Option<AssessmentStatus>,
        /// Assessment conclusion, if an assessment exists.
        conclusion: Option<Conclusion>,
    },

    /// Assessments can only be created or changed at an assessment stage.
    #[error("process {process_id} is at stage {stage}, not an assessment stage")]
    NotAtAssessmentStage {
        /// The process.
        process_id: ProcessId,
        /// Its current stage.
        stage: Stage,
    },

    /// The template does not cover the process's department and subject.
    #[error("template {template_id} does not apply to {department}/{subject_id}")]
    TemplateOutOfScope {
        /// The template.
        template_id: TemplateId,
        /// The process department.
        department: String,
        /// The process target entity.
        subject_id: String,
    },

    /// Only the process owner may do this.
    #[error("{user_id} is not the owner of process {process_id}")]
    NotOwner {
        /// The process.
        process_id: ProcessId,
        /// The caller.
        user_id: UserId,
    },

    /// Stored data could not be read at startup.
    #[error("cannot load stored data: {0}")]
    Load(#[from] PersistenceError),

    /// Stored data could not be migrated at startup.
    #[error("cannot migrate stored data: {0}")]
    Migration(#[from] MigrationError),
}
