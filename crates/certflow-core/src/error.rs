//! # Error Types
//!
//! Errors raised by the foundational types. Domain crates define their own
//! `thiserror` enums for state machine rejections; this one covers parsing
//! and arithmetic on the primitives themselves.

use thiserror::Error;

/// Top-level error type for the core primitives.
#[derive(Error, Debug)]
pub enum CertflowError {
    /// A timestamp string could not be parsed or was not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Date arithmetic left the representable range.
    #[error("timestamp arithmetic overflow: {0}")]
    TimestampOverflow(String),

    /// An identifier string was empty or malformed.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}
