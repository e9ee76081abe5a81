//! # certflow-core — Foundational Types
//!
//! Leaf crate of the certflow workspace. Every other crate depends on it;
//! it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `ProcessId`, `AssessmentId`,
//!    `CertificateId`, `TemplateId` and `UserId` are distinct types. An
//!    assessment identifier cannot be passed where a process identifier is
//!    expected.
//!
//! 2. **One role vocabulary.** [`Role`] is the single definition of the
//!    organisational roles. Stage tables, the transition guard and the
//!    visibility rule all match on it exhaustively.
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] is UTC with seconds precision and
//!    supports calendar-year arithmetic for certificate validity windows.
//!
//! 4. **Content digests.** Rendered certificate content is fingerprinted with
//!    SHA-256 through [`sha256_digest`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `certflow-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;
pub mod role;
pub mod temporal;

pub use digest::{sha256_digest, ContentDigest};
pub use error::CertflowError;
pub use identity::{AssessmentId, CertificateId, ProcessId, TemplateId, UserId};
pub use role::{Actor, Role};
pub use temporal::Timestamp;
