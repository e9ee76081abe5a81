//! # Timestamps
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to seconds precision.
//! Every record the engine writes (history entries, signatures, certificate
//! validity windows) uses it, so persisted JSON always carries
//! `YYYY-MM-DDTHH:MM:SSZ`.
//!
//! Certificate validity is expressed in calendar years, so the type offers
//! [`Timestamp::add_years`], which clamps Feb 29 to Feb 28 in non-leap years.

use chrono::{DateTime, Datelike, Months, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CertflowError;

/// A UTC instant with whole-second precision.
///
/// Built with [`Timestamp::now`], [`Timestamp::from_utc`] or
/// [`Timestamp::parse`]; all three drop sub-seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current instant.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Wrap a `chrono` instant.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse a timestamp from an RFC 3339 string with a `Z` suffix.
    ///
    /// # Errors
    ///
    /// Returns [`CertflowError::InvalidTimestamp`] if the string is not valid
    /// RFC 3339 or uses an explicit offset instead of `Z`.
    pub fn parse(s: &str) -> Result<Self, CertflowError> {
        if !s.ends_with('Z') {
            return Err(CertflowError::InvalidTimestamp(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            CertflowError::InvalidTimestamp(format!("invalid RFC 3339 timestamp {s:?}: {e}"))
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Calendar year of this timestamp.
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Add whole calendar years.
    ///
    /// # Errors
    ///
    /// Returns [`CertflowError::TimestampOverflow`] if the result is out of range.
    pub fn add_years(&self, years: u32) -> Result<Self, CertflowError> {
        let months = years.checked_mul(12).ok_or_else(|| {
            CertflowError::TimestampOverflow(format!("{years} years is out of range"))
        })?;
        self.0
            .checked_add_months(Months::new(months))
            .map(Self)
            .ok_or_else(|| {
                CertflowError::TimestampOverflow(format!("{} + {years} years", self.to_iso8601()))
            })
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// `YYYY-MM-DD`, as printed on certificates.
    pub fn to_date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}
