//! # certflow-assessment — Assessment Sub-engine
//!
//! Aggregates multiple independent assessor sign-offs into a single
//! pass/fail conclusion that gates the owning process's advancement.
//!
//! - **Quorum**: every assessor named at creation must sign (N-of-N), then
//!   the applicant confirms.
//! - **Conclusion**: `suggest_authorize` or `failed`, recorded once the
//!   assessment is complete. The engine turns it into an approve or reject
//!   transition of the owning process.
//! - **Reassessment**: resets signatures, evaluation and conclusion with a new
//!   panel without touching the owning process's stage.
//!
//! The crate knows nothing about processes beyond their identifier; role
//! checks for concluding live in the engine, which consults the stage guard.

pub mod assessment;

pub use assessment::{
    Assessment, AssessmentError, AssessmentStatus, Conclusion, Evaluation, Signature,
};
