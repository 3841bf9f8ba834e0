//! # verity-core
//!
//! Core library for verity - deterministic truth compilation over
//! crowd-sourced observations, backed by an event-sourced trust engine.
//!
//! This crate turns streams of human, sensor, and AI observations about
//! physical-world events into cryptographically signed, replayable truth
//! states, each addressed by a canonical key that any external party can
//! independently recompute.
//!
//! ## Subsystems
//!
//! - **Truth compiler** ([`compiler`]): a pure function from a claim
//!   contract, a truth key, observations, and a frozen trust snapshot to a
//!   signed [`TruthState`](primitives::TruthState). Byte-identical inputs
//!   produce byte-identical output.
//! - **Trust engine** ([`trust`]): an event-sourced reducer computing agent
//!   standing from an immutable signal log under a versioned policy, plus a
//!   trust computer deriving context-local effective power and frozen
//!   [`TrustSnapshot`](primitives::TrustSnapshot)s.
//!
//! ## Determinism
//!
//! Every protocol hash goes through [`canonical`]: sorted keys, NFC strings,
//! floats quantized to six decimals, UTC timestamps. The compiler receives
//! `compile_time` explicitly and the reducer receives `as_of_time`
//! explicitly; nothing in this crate reads a wall clock, the network, or a
//! database.
//!
//! ## Example
//!
//! ```rust,no_run
//! use verity_core::compiler::{compile_truth_state, CompileContext};
//! use verity_core::signing::HmacSigner;
//!
//! # fn example(
//! #     claim_type: &verity_core::primitives::ClaimType,
//! #     truth_key: &str,
//! #     observations: &[verity_core::primitives::Observation],
//! #     snapshot: &verity_core::primitives::TrustSnapshot,
//! #     compile_time: chrono::DateTime<chrono::Utc>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let signer = HmacSigner::new(b"dev-key", "dev-key-1");
//! let state = compile_truth_state(
//!     claim_type,
//!     truth_key,
//!     observations,
//!     snapshot,
//!     "policy:verity_v1.0.0",
//!     verity_core::compiler::COMPILER_VERSION,
//!     compile_time,
//!     &CompileContext::default(),
//!     &signer,
//! )?;
//! assert!(state.verify_hashes());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod canonical;
pub mod compiler;
pub mod confidence;
pub mod consensus;
pub mod derivation;
pub mod ledger;
pub mod primitives;
pub mod schema;
pub mod signing;
pub mod temporal;
pub mod trust;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::compiler::{CompileContext, CompileError, compile_truth_state};
    pub use crate::primitives::{
        ClaimType, EvidenceRef, Observation, TruthKey, TruthState, TrustSnapshot,
    };
    pub use crate::signing::{Signer, SigningMethod};
    pub use crate::trust::{Signal, SignalStore, SignalType, TrustEngine, TrustPolicy};
}

/// Re-export commonly used types at the crate root.
pub use compiler::{CompileContext, compile_truth_state};
pub use primitives::{ClaimType, Observation, TruthKey, TruthState, TrustSnapshot};
pub use trust::{Signal, TrustEngine, TrustPolicy};
