//! Timezone-aware temporal index.
//!
//! Parses and emits UTC instants, performs ISO-8601 duration arithmetic, and
//! truncates instants to bucket boundaries for truth key formation.
//!
//! Naive datetimes are rejected at parse time: every instant entering the
//! core carries an explicit offset and is converted to UTC. All arithmetic
//! is exact on second integers; no floating-point time exists anywhere.
//!
//! # Example
//!
//! ```
//! use verity_core::temporal::{bucket, format_bucket, parse_datetime, BucketDuration};
//!
//! let dt = parse_datetime("2026-01-07T12:34:56+02:00").unwrap();
//! let b = bucket(dt, &BucketDuration::parse("PT1H").unwrap());
//! assert_eq!(format_bucket(b), "2026-01-07T10:00Z");
//! ```

mod bucket;
mod parse;

pub use bucket::{BucketDuration, bucket, bucket_bounds, format_bucket};
pub use parse::{
    TemporalError, canonical_datetime, canonical_datetime_millis, parse_datetime,
};
