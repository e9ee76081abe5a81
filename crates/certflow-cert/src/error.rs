//! Errors raised by certificate issuance and revocation.

use thiserror::Error;

use certflow_core::{CertflowError, CertificateId, ProcessId, TemplateId, Timestamp};
use certflow_state::{Stage, WorkflowKind};

use crate::certificate::CertificateStatus;

/// Errors raised by certificate issuance and revocation.
#[derive(Error, Debug)]
pub enum CertificateError {
    /// The process already has a certificate.
    #[error("process {process_id} already has certificate {certificate_id}")]
    AlreadyIssued {
        /// The process.
        process_id: ProcessId,
        /// The existing certificate.
        certificate_id: CertificateId,
    },

    /// A required template variable was not supplied.
    #[error("template {template_id} requires variable {key:?}")]
    MissingVariable {
        /// The template.
        template_id: TemplateId,
        /// The missing key.
        key: String,
    },

    /// The certificate is already revoked.
    #[error("certificate {certificate_id} is already revoked")]
    AlreadyRevoked {
        /// The certificate.
        certificate_id: CertificateId,
    },

    /// The certificate is not valid, so it cannot be revoked.
    #[error("certificate {certificate_id} is {status}, not valid")]
    NotValid {
        /// The certificate.
        certificate_id: CertificateId,
        /// Its current status.
        status: CertificateStatus,
    },

    /// Certificates are only issued for completed processes.
    #[error("process {process_id} is at stage {stage}, not completed")]
    ProcessNotCompleted {
        /// The process.
        process_id: ProcessId,
        /// Its current stage.
        stage: Stage,
    },

    /// The process's workflow never leads to a certificate.
    #[error("process {process_id} is a {kind} process, which is not certified")]
    NotCertifiable {
        /// The process.
        process_id: ProcessId,
        /// Its workflow kind.
        kind: WorkflowKind,
    },

    /// No further certificate number is available under `stem`.
    #[error("certificate numbers under {stem} are exhausted")]
    NumberingExhausted {
        /// The `<PREFIX>-<YEAR>-` stem.
        stem: String,
    },

    /// The requested expiry does not fall after the issue time.
    #[error("expiry {expire_at} is not after issue time {issued_at}")]
    ExpiryNotAfterIssue {
        /// Issue time.
        issued_at: Timestamp,
        /// Requested expiry.
        expire_at: Timestamp,
    },

    /// The validity window could not be computed.
    #[error("invalid validity window: {0}")]
    Validity(#[from] CertflowError),
}
