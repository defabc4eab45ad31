//! # provena — Code-Provenance Match Engine
//!
//! Detects when a code change submitted to a target repository closely
//! matches a change already present in a designated upstream source
//! repository, for attribution and license-compliance enforcement.
//!
//! ## Architecture (2-Layer Pipeline)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ProvenaEngine                           │
//! │  ┌──────────┐  ┌─────────────┐  ┌──────────────────────┐    │
//! │  │ Triage   │  │ Normalizer  │  │ FingerprintStore     │    │
//! │  │ filters  │  │ (per-lang)  │  │ (commits + PRs)      │    │
//! │  └────┬─────┘  └──────┬──────┘  └──────────┬───────────┘    │
//! │       │               │                    │                │
//! │  ┌────▼───────────────▼────────────────────▼────────────┐   │
//! │  │ Layer 1 — CandidateGenerator                         │   │
//! │  │ patch-id exact hits + simhash nearest-neighbor       │   │
//! │  └────────────────────────┬─────────────────────────────┘   │
//! │                           │                                 │
//! │  ┌────────────────────────▼─────────────────────────────┐   │
//! │  │ Layer 2 — DeepValidator (bounded parallel fetches)   │   │
//! │  │ fresh source diff → jaccard + subset coverage        │   │
//! │  └────────────────────────┬─────────────────────────────┘   │
//! │                           │                                 │
//! │         Rank by jaccard → CheckReport { matched, evidence } │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Capabilities
//!
//! - **Branding-aware normalization**: identifier rewriting across fork
//!   renames, preserved-keyword protection, comment stripping per grammar
//! - **Dual fingerprints**: 64-bit SimHash (locality-sensitive) plus a
//!   content-addressed patch identity (exact, metadata-invariant)
//! - **Two-layer matching**: cheap local candidates confirmed by precise
//!   token-shingle comparison against freshly fetched source content
//! - **Partial-copy detection**: asymmetric subset coverage catches a PR
//!   that lifts a fragment of a much larger upstream change
//! - **Failure isolation**: a vanished or rate-limited source is a
//!   per-candidate outcome, never an aggregate failure

pub mod config;
pub mod diff;
pub mod engine;
pub mod fetch;
pub mod fingerprint;
pub mod normalize;
pub mod store;

// Re-exports for convenience
pub use config::{BrandingRule, PrefixRule, ProvenaConfig};
pub use diff::DiffUnit;
pub use engine::{
    CheckReport, MatchCandidate, MatchKind, ProvenaEngine, ValidationOutcome, ValidationVerdict,
};
pub use fetch::{DiffFetcher, FetchError};
pub use fingerprint::{PatchId, SimHash64};
pub use normalize::{Language, NormalizedDiff, Token};
pub use store::{FingerprintRecord, FingerprintStore, Partition, SourceId};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvenaError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt fingerprint database: {0}")]
    CorruptDatabase(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ProvenaResult<T> = Result<T, ProvenaError>;
