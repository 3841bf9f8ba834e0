//! Time bucketing for truth key formation.
//!
//! A bucket duration is an ISO-8601 duration (`PT1H`, `PT15M`, `P1D`, ...).
//! Bucketing truncates — never rounds — an instant to the boundary of the
//! bucket containing it. Sub-day buckets align to midnight UTC; day-and-up
//! buckets truncate to the start of the day.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::parse::TemporalError;

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?)?$").expect("static pattern")
    })
}

/// A parsed ISO-8601 bucket duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketDuration {
    days: u32,
    hours: u32,
    minutes: u32,
}

impl BucketDuration {
    /// Parses an ISO-8601 duration of the form `P[nD][T[nH][nM]]`.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalError::InvalidDuration`] for malformed input and
    /// [`TemporalError::ZeroDuration`] for `P0D`-style zero lengths.
    pub fn parse(input: &str) -> Result<Self, TemporalError> {
        let upper = input.to_uppercase();
        let caps = duration_pattern()
            .captures(&upper)
            .ok_or_else(|| TemporalError::InvalidDuration {
                input: input.to_string(),
            })?;

        let group = |i: usize| -> u32 {
            caps.get(i)
                .map_or(0, |m| m.as_str().parse().unwrap_or(0))
        };
        let parsed = Self {
            days: group(1),
            hours: group(2),
            minutes: group(3),
        };
        if parsed.total_seconds() == 0 {
            return Err(TemporalError::ZeroDuration {
                input: input.to_string(),
            });
        }
        Ok(parsed)
    }

    /// Total length in seconds.
    #[must_use]
    pub const fn total_seconds(&self) -> i64 {
        self.days as i64 * 86_400 + self.hours as i64 * 3_600 + self.minutes as i64 * 60
    }

    /// Whether this duration spans whole days.
    #[must_use]
    pub const fn is_daily(&self) -> bool {
        self.days > 0 && self.hours == 0 && self.minutes == 0
    }

    /// The canonical uppercase ISO-8601 string form.
    #[must_use]
    pub fn as_iso8601(&self) -> String {
        let mut out = String::from("P");
        if self.days > 0 {
            out.push_str(&format!("{}D", self.days));
        }
        if self.hours > 0 || self.minutes > 0 {
            out.push('T');
            if self.hours > 0 {
                out.push_str(&format!("{}H", self.hours));
            }
            if self.minutes > 0 {
                out.push_str(&format!("{}M", self.minutes));
            }
        }
        out
    }
}

impl TryFrom<String> for BucketDuration {
    type Error = TemporalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BucketDuration> for String {
    fn from(value: BucketDuration) -> Self {
        value.as_iso8601()
    }
}

/// Truncates an instant to the boundary of its bucket.
///
/// Day-and-up durations truncate to the start of the UTC day; sub-day
/// durations truncate on the seconds-since-epoch grid, which aligns them to
/// midnight UTC because every supported sub-day length divides a day.
#[must_use]
pub fn bucket(dt: DateTime<Utc>, duration: &BucketDuration) -> DateTime<Utc> {
    let secs = dt.timestamp();
    let step = if duration.is_daily() {
        86_400
    } else {
        duration.total_seconds()
    };
    let floored = secs.div_euclid(step) * step;
    DateTime::from_timestamp(floored, 0).unwrap_or(dt)
}

/// Returns the `[start, end)` bounds of the bucket containing `dt`.
#[must_use]
pub fn bucket_bounds(
    dt: DateTime<Utc>,
    duration: &BucketDuration,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = bucket(dt, duration);
    (start, start + Duration::seconds(duration.total_seconds()))
}

/// Formats a bucket start in canonical minute-precision form:
/// `YYYY-MM-DDTHH:MMZ`.
#[must_use]
pub fn format_bucket(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%MZ").to_string()
}

#[cfg(test)]
mod tests {
    use crate::temporal::parse_datetime;

    use super::*;

    fn dt(s: &str) -> DateTime<Utc> {
        parse_datetime(s).unwrap()
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!(BucketDuration::parse("PT1H").unwrap().total_seconds(), 3_600);
        assert_eq!(BucketDuration::parse("PT15M").unwrap().total_seconds(), 900);
        assert_eq!(BucketDuration::parse("P1D").unwrap().total_seconds(), 86_400);
        assert_eq!(
            BucketDuration::parse("P1DT6H").unwrap().total_seconds(),
            108_000
        );
        // Lowercase input is accepted and canonicalized
        assert_eq!(BucketDuration::parse("pt4h").unwrap().as_iso8601(), "PT4H");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(matches!(
            BucketDuration::parse("1H"),
            Err(TemporalError::InvalidDuration { .. })
        ));
        assert!(matches!(
            BucketDuration::parse("P"),
            Err(TemporalError::ZeroDuration { .. })
        ));
        assert!(matches!(
            BucketDuration::parse("P0D"),
            Err(TemporalError::ZeroDuration { .. })
        ));
    }

    #[test]
    fn test_hourly_truncation() {
        let b = bucket(dt("2026-01-07T12:34:56Z"), &BucketDuration::parse("PT1H").unwrap());
        assert_eq!(format_bucket(b), "2026-01-07T12:00Z");
    }

    #[test]
    fn test_four_hour_truncation() {
        let d = BucketDuration::parse("PT4H").unwrap();
        assert_eq!(format_bucket(bucket(dt("2026-01-07T13:10:00Z"), &d)), "2026-01-07T12:00Z");
        assert_eq!(format_bucket(bucket(dt("2026-01-07T03:59:59Z"), &d)), "2026-01-07T00:00Z");
    }

    #[test]
    fn test_fifteen_minute_truncation() {
        let d = BucketDuration::parse("PT15M").unwrap();
        assert_eq!(format_bucket(bucket(dt("2026-01-07T12:44:00Z"), &d)), "2026-01-07T12:30Z");
    }

    #[test]
    fn test_daily_truncation() {
        let d = BucketDuration::parse("P1D").unwrap();
        assert_eq!(format_bucket(bucket(dt("2026-01-07T23:59:59Z"), &d)), "2026-01-07T00:00Z");
    }

    #[test]
    fn test_multi_day_truncates_to_day_start() {
        let d = BucketDuration::parse("P7D").unwrap();
        assert_eq!(format_bucket(bucket(dt("2026-01-07T12:00:00Z"), &d)), "2026-01-07T00:00Z");
    }

    #[test]
    fn test_bucket_is_idempotent() {
        let d = BucketDuration::parse("PT1H").unwrap();
        let once = bucket(dt("2026-01-07T12:34:56Z"), &d);
        assert_eq!(bucket(once, &d), once);
    }

    #[test]
    fn test_bucket_bounds() {
        let d = BucketDuration::parse("PT1H").unwrap();
        let (start, end) = bucket_bounds(dt("2026-01-07T12:34:56Z"), &d);
        assert_eq!(format_bucket(start), "2026-01-07T12:00Z");
        assert_eq!(format_bucket(end), "2026-01-07T13:00Z");
    }

    #[test]
    fn test_truncation_converts_offsets_first() {
        // 00:30+02:00 is 22:30Z the previous day.
        let d = BucketDuration::parse("PT1H").unwrap();
        let b = bucket(dt("2026-01-08T00:30:00+02:00"), &d);
        assert_eq!(format_bucket(b), "2026-01-07T22:00Z");
    }
}
