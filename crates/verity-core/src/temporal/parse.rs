//! Datetime parsing and canonical formatting.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Errors that can occur in temporal parsing and arithmetic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemporalError {
    /// A datetime without an explicit UTC offset was provided.
    ///
    /// Naive datetimes are ambiguous and are rejected everywhere in the
    /// core.
    #[error("naive datetime not allowed: '{input}' carries no UTC offset")]
    NaiveDatetime {
        /// The offending input.
        input: String,
    },

    /// A datetime string could not be parsed.
    #[error("cannot parse datetime: '{input}'")]
    InvalidDatetime {
        /// The offending input.
        input: String,
    },

    /// An ISO-8601 duration string could not be parsed.
    #[error("invalid ISO-8601 duration: '{input}'")]
    InvalidDuration {
        /// The offending input.
        input: String,
    },

    /// A duration of zero length was provided where a bucket size is needed.
    #[error("duration must be non-zero: '{input}'")]
    ZeroDuration {
        /// The offending input.
        input: String,
    },
}

impl TemporalError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NaiveDatetime { .. } => "naive_datetime",
            Self::InvalidDatetime { .. }
            | Self::InvalidDuration { .. }
            | Self::ZeroDuration { .. } => "non_canonical_input",
        }
    }
}

/// Parses a datetime string into a UTC instant.
///
/// Accepts ISO-8601 with an explicit offset (`Z`, `+HH:MM`, `-HH:MM`), at
/// minute, second, or sub-second precision. Any other input — in particular
/// a naive datetime — is rejected.
///
/// # Errors
///
/// Returns [`TemporalError::NaiveDatetime`] for offset-less input and
/// [`TemporalError::InvalidDatetime`] for anything unparseable.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, TemporalError> {
    let s = s.trim();

    // RFC 3339 covers second and sub-second precision with offsets.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Minute precision with Z: the canonical time-bucket form.
    if let Some(stripped) = s.strip_suffix('Z') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M") {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    // Minute precision with a numeric offset.
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

    // If it parses as a naive datetime the input is ambiguous, not malformed.
    let naive_forms = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];
    for fmt in naive_forms {
        if NaiveDateTime::parse_from_str(s, fmt).is_ok() {
            return Err(TemporalError::NaiveDatetime {
                input: s.to_string(),
            });
        }
    }

    Err(TemporalError::InvalidDatetime {
        input: s.to_string(),
    })
}

/// Formats an instant in canonical second-precision form:
/// `YYYY-MM-DDTHH:MM:SSZ`.
#[must_use]
pub fn canonical_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Formats an instant with millisecond precision, for fields whose contract
/// demands it: `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn canonical_datetime_millis(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
