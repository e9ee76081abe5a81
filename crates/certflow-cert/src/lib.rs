//! # certflow-cert — Certificate Issuance
//!
//! The terminal action of a workflow: render a template for a completed
//! process and keep the result as an immutable record.
//!
//! - [`template`]: templates, their declared variables and literal
//!   `{{key}}` rendering. Unresolved placeholders stay in the output.
//! - [`certificate`]: the issued record. Expiry is derived from the clock on
//!   read; revocation is the only stored status change.
//! - [`issuance`]: the registry that renders, numbers and stores
//!   certificates, at most one per process.

pub mod certificate;
pub mod error;
pub mod issuance;
pub mod template;

pub use certificate::{Certificate, CertificateStatus, Revocation};
pub use error::CertificateError;
pub use issuance::{CertificateRegistry, Holder, IssueRequest};
pub use template::{
    render, ScopeKey, Template, TemplateVariable, VariableSource, BUILT_IN_KEYS, DEFAULT_EXPIRE_YEARS,
};
