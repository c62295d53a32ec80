//! Durations used for aggregation windows, recomputation periods and
//! alignment windows.
//!
//! Written as `<integer><unit>`, e.g. `"2h"`, `"14d"`, `"1m"`.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    pub fn seconds(&self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3600,
            TimeUnit::Days => 86400,
            TimeUnit::Weeks => 604800,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "m",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
            TimeUnit::Weeks => "w",
        }
    }
}

/// Longest span accepted, so that the span in microseconds fits an `i64`
pub const MAX_SPAN_SECONDS: u64 = (i64::MAX / 1_000_000) as u64;

/// A positive duration such as a trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSpan {
    pub value: u64,
    pub unit: TimeUnit,
}

impl TimeSpan {
    pub fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    pub fn minutes(value: u64) -> Self {
        Self::new(value, TimeUnit::Minutes)
    }

    pub fn hours(value: u64) -> Self {
        Self::new(value, TimeUnit::Hours)
    }

    pub fn days(value: u64) -> Self {
        Self::new(value, TimeUnit::Days)
    }

    /// Build a span, rejecting zero and anything longer than
    /// [`MAX_SPAN_SECONDS`]
    pub fn try_new(value: u64, unit: TimeUnit) -> Result<Self> {
        let span = Self { value, unit };
        span.check().map_err(|reason| CoreError::InvalidDuration {
            input: span.to_string(),
            reason: reason.to_string(),
        })?;
        Ok(span)
    }

    fn check(&self) -> std::result::Result<(), &'static str> {
        if self.value == 0 {
            return Err("duration must be positive");
        }
        match self.value.checked_mul(self.unit.seconds()) {
            Some(seconds) if seconds <= MAX_SPAN_SECONDS => Ok(()),
            _ => Err("duration is too large"),
        }
    }

    /// Convert to seconds, saturating at [`MAX_SPAN_SECONDS`]
    pub fn as_seconds(&self) -> u64 {
        self.value
            .saturating_mul(self.unit.seconds())
            .min(MAX_SPAN_SECONDS)
    }

    /// Convert to microseconds, the resolution timestamps are compared at
    pub fn as_micros(&self) -> i64 {
        self.as_seconds() as i64 * 1_000_000
    }

    pub fn to_chrono(&self) -> chrono::Duration {
        chrono::Duration::microseconds(self.as_micros())
    }

    /// Parse from a string like `"24h"`, `"7d"`, `"5m"`.
    ///
    /// Unknown units are rejected instead of falling back to a default, so a
    /// typo such as `"2x"` surfaces at configuration time.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = |reason: &str| CoreError::InvalidDuration {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid("missing unit (expected one of s, m, h, d, w)"))?;
        let (value_str, unit_str) = trimmed.split_at(split);
        if value_str.is_empty() {
            return Err(invalid("missing integer value"));
        }

        let value = value_str
            .parse::<u64>()
            .map_err(|e| invalid(&e.to_string()))?;

        let unit = match unit_str {
            "s" => TimeUnit::Seconds,
            "m" => TimeUnit::Minutes,
            "h" => TimeUnit::Hours,
            "d" => TimeUnit::Days,
            "w" => TimeUnit::Weeks,
            other => return Err(invalid(&format!("unknown unit '{}'", other))),
        };

        let span = Self { value, unit };
        span.check().map_err(invalid)?;
        Ok(span)
    }
}

impl FromStr for TimeSpan {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimeSpan {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<TimeSpan> for String {
    fn from(span: TimeSpan) -> Self {
        span.to_string()
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}
