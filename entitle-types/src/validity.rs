//! Certificate validity windows and server timestamp parsing.

use crate::{Error, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Substitute for server timestamps too far in the future to represent.
pub const OVERFLOW_FALLBACK_DATE: &str = "9999-09-06T00:00:00Z";

/// A half-open validity window `[begin, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityRange {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ValidityRange {
    /// Creates a validity range.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRange` if `begin` is after `end`.
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if begin > end {
            return Err(Error::InvalidRange {
                begin: begin.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { begin, end })
    }

    /// Returns the first instant of validity.
    #[must_use]
    pub const fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    /// Returns the first instant after validity.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns true if `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.begin <= at && at < self.end
    }

    /// Returns true if the window contains the current instant.
    #[must_use]
    pub fn has_now(&self) -> bool {
        self.contains(Utc::now())
    }

    /// Returns true if the window has not started yet at `at`.
    #[must_use]
    pub fn starts_after(&self, at: DateTime<Utc>) -> bool {
        self.begin > at
    }

    /// Returns true if the window is already over at `at`.
    #[must_use]
    pub fn ended_before(&self, at: DateTime<Utc>) -> bool {
        self.end <= at
    }

    /// Time left until the window closes, negative once it has.
    #[must_use]
    pub fn remaining(&self, at: DateTime<Utc>) -> Duration {
        self.end - at
    }
}

/// Parses a timestamp as emitted by the entitlement authority.
///
/// Accepts RFC 3339 as well as the `+0000` offset form without a colon.
/// Timestamps whose year cannot be represented are clamped to
/// [`OVERFLOW_FALLBACK_DATE`].
///
/// # Errors
///
/// Returns `Error::InvalidTimestamp` if the input is not a timestamp at all.
pub fn parse_server_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(parsed.with_timezone(&Utc));
    }

    if year_overflows(raw) {
        warn!(date = %raw, "Date overflow, using {OVERFLOW_FALLBACK_DATE} instead");
        return Ok(overflow_fallback());
    }

    Err(Error::InvalidTimestamp(raw.to_string()))
}

fn year_overflows(raw: &str) -> bool {
    let digits = raw.trim_start_matches('+');
    let year = match digits.split_once('-') {
        Some((year, _)) => year,
        None => return false,
    };
    year.len() > 4 && year.bytes().all(|b| b.is_ascii_digit())
}

fn overflow_fallback() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 9, 6, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
