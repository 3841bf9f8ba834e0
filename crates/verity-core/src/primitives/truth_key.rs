//! Truth keys: canonical addresses for claims across space and time.
//!
//! A truth key has six ordered segments
//! `{domain}:{topic}:{spatial_system}:{spatial_id}:{z_index}:{time_bucket}`.
//! The string form and the structured form are bijective after
//! canonicalization.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canonical::{is_canonical_id, sha256_hex};
use crate::temporal::{bucket, format_bucket};

use super::claim_type::{ClaimType, IdStrategy};

fn time_bucket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}Z$").expect("static pattern")
    })
}

/// Claim domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Terrestrial events.
    Earth,
    /// Marine events.
    Ocean,
    /// Orbital and astronomical events.
    Space,
    /// Non-spatial claims: artifacts, datasets, research outputs.
    Meta,
}

impl Domain {
    /// The lowercase canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Earth => "earth",
            Self::Ocean => "ocean",
            Self::Space => "space",
            Self::Meta => "meta",
        }
    }
}

impl FromStr for Domain {
    type Err = TruthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "earth" => Ok(Self::Earth),
            "ocean" => Ok(Self::Ocean),
            "space" => Ok(Self::Space),
            "meta" => Ok(Self::Meta),
            other => Err(TruthKeyError::UnknownDomain {
                domain: other.to_string(),
            }),
        }
    }
}

/// Spatial indexing systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialSystem {
    /// H3 hexagonal cells (earth, ocean).
    H3,
    /// Geohash cells.
    Geohash,
    /// HEALPix pixels (space).
    Healpix,
    /// Non-spatial identity derived per the contract `id_strategy`.
    Meta,
}

impl SpatialSystem {
    /// The lowercase canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::H3 => "h3",
            Self::Geohash => "geohash",
            Self::Healpix => "healpix",
            Self::Meta => "meta",
        }
    }
}

impl FromStr for SpatialSystem {
    type Err = TruthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h3" => Ok(Self::H3),
            "geohash" => Ok(Self::Geohash),
            "healpix" => Ok(Self::Healpix),
            "meta" => Ok(Self::Meta),
            other => Err(TruthKeyError::SpatialSystemUnsupported {
                system: other.to_string(),
            }),
        }
    }
}

/// Errors that can occur parsing or building truth keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TruthKeyError {
    /// The key string does not have six colon-delimited segments.
    #[error("invalid truth key format: '{key}' (expected 6 segments)")]
    InvalidFormat {
        /// The offending key.
        key: String,
    },

    /// A segment violates the canonical charset `[a-z0-9._-]`.
    #[error("invalid truth key segment '{segment}': must match [a-z0-9._-]+")]
    InvalidSegment {
        /// The offending segment.
        segment: String,
    },

    /// The domain segment is not a known domain.
    #[error("unknown domain: '{domain}'")]
    UnknownDomain {
        /// The offending domain.
        domain: String,
    },

    /// The spatial system is not supported.
    #[error("unsupported spatial system: '{system}'")]
    SpatialSystemUnsupported {
        /// The offending system.
        system: String,
    },

    /// The time bucket segment is not in `YYYY-MM-DDTHH:MMZ` form.
    #[error("invalid time bucket: '{bucket}' (expected YYYY-MM-DDTHH:MMZ)")]
    InvalidTimeBucket {
        /// The offending bucket string.
        bucket: String,
    },

    /// A spatial claim was built without a spatial id.
    #[error("spatial id required for spatial system '{system}'")]
    MissingSpatialId {
        /// The spatial system that needed an id.
        system: String,
    },

    /// A meta claim was built without the identity its strategy requires.
    #[error("meta id strategy '{strategy}' is missing its required input")]
    MissingMetaIdentity {
        /// The strategy that could not be satisfied.
        strategy: String,
    },
}

impl TruthKeyError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SpatialSystemUnsupported { .. } => "spatial_system_unsupported",
            _ => "truthkey_invalid",
        }
    }
}

/// A parsed, canonical truth key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TruthKey {
    /// Claim domain.
    pub domain: Domain,
    /// Claim topic, e.g. `flood`.
    pub topic: String,
    /// Spatial indexing system.
    pub spatial_system: SpatialSystem,
    /// Cell id, pixel id, or meta identity.
    pub spatial_id: String,
    /// Vertical index: `surface`, `underwater`, `knowledge`, ...
    pub z_index: String,
    /// Bucket start in canonical `YYYY-MM-DDTHH:MMZ` form.
    pub time_bucket: String,
}

impl TruthKey {
    /// Computes the SHA-256 of the canonical string form.
    #[must_use]
    pub fn hash(&self) -> String {
        sha256_hex(self.to_string().as_bytes())
    }
}

impl fmt::Display for TruthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.domain.as_str(),
            self.topic,
            self.spatial_system.as_str(),
            self.spatial_id,
            self.z_index,
            self.time_bucket,
        )
    }
}

impl FromStr for TruthKey {
    type Err = TruthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_truth_key(s)
    }
}

/// Parses a truth key string into its structured form.
///
/// Segments are lowercased; the time bucket keeps its canonical form. The
/// parse is the exact inverse of [`TruthKey::to_string`].
///
/// # Errors
///
/// Returns [`TruthKeyError`] for malformed keys.
pub fn parse_truth_key(key: &str) -> Result<TruthKey, TruthKeyError> {
    // The time bucket contains colons, so split off the first five segments
    // and keep the remainder intact.
    let parts: Vec<&str> = key.splitn(6, ':').collect();
    if parts.len() != 6 {
        return Err(TruthKeyError::InvalidFormat {
            key: key.to_string(),
        });
    }

    let domain = Domain::from_str(parts[0])?;
    let spatial_system = SpatialSystem::from_str(parts[2])?;

    let topic = parts[1].to_lowercase();
    let spatial_id = parts[3].to_lowercase();
    let z_index = parts[4].to_lowercase();
    for segment in [&topic, &spatial_id, &z_index] {
        if !is_canonical_id(segment) {
            return Err(TruthKeyError::InvalidSegment {
                segment: segment.clone(),
            });
        }
    }

    let time_bucket = parts[5].to_string();
    if !time_bucket_pattern().is_match(&time_bucket) {
        return Err(TruthKeyError::InvalidTimeBucket { bucket: time_bucket });
    }

    Ok(TruthKey {
        domain,
        topic,
        spatial_system,
        spatial_id,
        z_index,
        time_bucket,
    })
}

/// Inputs for building a truth key under a claim contract.
#[derive(Debug, Clone, Default)]
pub struct TruthKeyInputs<'a> {
    /// Cell/pixel id for spatial systems (ingestion computes it; the core
    /// validates the charset only).
    pub spatial_id: Option<&'a str>,
    /// Content hash for meta claims using `content_hash` or `hybrid`.
    pub content_hash: Option<&'a str>,
    /// Caller-provided stable id for meta claims using `provided_id` or
    /// `hybrid`.
    pub artifact_id: Option<&'a str>,
}

/// Builds a canonical truth key from a claim contract, an event time, and
/// spatial inputs.
///
/// The key derives from the *event* time, bucketed with the contract's
/// `time_bucket` duration. For `spatial_system = meta`, the spatial id is
/// derived per the contract `id_strategy`:
///
/// - `content_hash`: first 32 hex characters of the content hash;
/// - `provided_id`: the caller-provided stable id, lowercased;
/// - `hybrid`: content hash when present, else the provided id.
///
/// # Errors
///
/// Returns [`TruthKeyError`] when a required identity input is missing or a
/// resulting segment is not canonical.
pub fn build_truth_key(
    claim_type: &ClaimType,
    event_time: DateTime<Utc>,
    inputs: &TruthKeyInputs<'_>,
) -> Result<TruthKey, TruthKeyError> {
    let config = &claim_type.truthkey;
    let bucketed = bucket(event_time, &config.time_bucket);

    let spatial_id = match config.spatial_system {
        SpatialSystem::Meta => derive_meta_id(config.id_strategy, inputs)?,
        system => inputs
            .spatial_id
            .map(str::to_lowercase)
            .ok_or_else(|| TruthKeyError::MissingSpatialId {
                system: system.as_str().to_string(),
            })?,
    };
    if !is_canonical_id(&spatial_id) {
        return Err(TruthKeyError::InvalidSegment {
            segment: spatial_id,
        });
    }

    let topic = claim_type.topic.to_lowercase();
    let z_index = config.z_index.to_lowercase();
    for segment in [&topic, &z_index] {
        if !is_canonical_id(segment) {
            return Err(TruthKeyError::InvalidSegment {
                segment: segment.clone(),
            });
        }
    }

    Ok(TruthKey {
        domain: claim_type.domain,
        topic,
        spatial_system: config.spatial_system,
        spatial_id,
        z_index,
        time_bucket: format_bucket(bucketed),
    })
}

fn derive_meta_id(
    strategy: IdStrategy,
    inputs: &TruthKeyInputs<'_>,
) -> Result<String, TruthKeyError> {
    let truncated_hash = inputs
        .content_hash
        .map(|h| h.to_lowercase().chars().take(32).collect::<String>());
    match strategy {
        IdStrategy::ContentHash => {
            truncated_hash.ok_or_else(|| TruthKeyError::MissingMetaIdentity {
                strategy: "content_hash".to_string(),
            })
        },
        IdStrategy::ProvidedId => inputs
            .artifact_id
            .map(str::to_lowercase)
            .ok_or_else(|| TruthKeyError::MissingMetaIdentity {
                strategy: "provided_id".to_string(),
            }),
        IdStrategy::Hybrid => truncated_hash
            .or_else(|| inputs.artifact_id.map(str::to_lowercase))
            .ok_or_else(|| TruthKeyError::MissingMetaIdentity {
                strategy: "hybrid".to_string(),
            }),
    }
}
