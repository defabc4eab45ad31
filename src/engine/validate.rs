//! Layer 2 — deep validation against freshly fetched source content
//!
//! Layer 1 candidates are only hypotheses; this layer fetches each
//! candidate's authoritative diff, re-normalizes it with the same rules,
//! and compares token-shingle sets precisely. Two scores:
//!
//! - **jaccard** — symmetric intersection-over-union.
//! - **subset coverage** — the fraction of the PR's own shingles found
//!   inside the source change, evaluated over the whole PR and over each
//!   file unit. Asymmetric by design: a PR that lifts one file verbatim
//!   out of a sprawling upstream change scores low on jaccard but full
//!   coverage on the lifted unit.
//!
//! Every failure is a per-candidate outcome. A 404 means the source is
//! gone (benign non-match); exhausted retries mark the candidate
//! incomplete. Neither aborts the remaining candidates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::candidates::MatchCandidate;
use crate::config::ProvenaConfig;
use crate::diff::{split_unified_diff, DiffUnit};
use crate::fetch::{fetch_with_retry, DiffFetcher, FetchError};
use crate::fingerprint::shingle_set;
use crate::normalize::{normalize_unit, normalize_units};

/// How a candidate's validation concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    /// Source fetched and compared
    Validated,
    /// Source identifier no longer resolves — benign non-match
    SourceGone,
    /// Fetch failed after all retries; similarity unknown
    Incomplete,
}

/// Per-candidate verdict with its evidence scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub candidate: MatchCandidate,
    pub jaccard: f64,
    pub subset_coverage: f64,
    pub accepted: bool,
    pub outcome: ValidationOutcome,
}

/// The PR side of the comparison, shingled once and shared by all
/// concurrent validations.
pub struct PrShingles {
    pub combined: HashSet<u64>,
    pub per_unit: Vec<HashSet<u64>>,
}

impl PrShingles {
    pub fn build(units: &[DiffUnit], config: &ProvenaConfig) -> Self {
        let combined = shingle_set(&normalize_units(units, config), config.shingle_width);
        let per_unit = units
            .iter()
            .map(|u| normalize_unit(u, config))
            .filter(|n| !n.is_empty())
            .map(|n| shingle_set(&n, config.shingle_width))
            .collect();
        Self { combined, per_unit }
    }
}

/// Intersection-over-union of two shingle sets, in `[0, 1]`.
pub fn jaccard(a: &HashSet<u64>, b: &HashSet<u64>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Fraction of `of`'s shingles found in `within`, in `[0, 1]`.
pub fn coverage(of: &HashSet<u64>, within: &HashSet<u64>) -> f64 {
    if of.is_empty() {
        0.0
    } else {
        of.intersection(within).count() as f64 / of.len() as f64
    }
}

/// Validate one candidate against its freshly fetched source diff.
pub async fn validate(
    candidate: MatchCandidate,
    pr: &PrShingles,
    fetcher: &dyn DiffFetcher,
    config: &ProvenaConfig,
) -> ValidationVerdict {
    let source_id = candidate.record.source_id.clone();
    let diff_text = match fetch_with_retry(fetcher, &source_id, config.retry_attempts).await {
        Ok(text) => text,
        Err(FetchError::NotFound) => {
            tracing::debug!(source = %source_id, "source vanished; treating as non-match");
            return ValidationVerdict {
                candidate,
                jaccard: 0.0,
                subset_coverage: 0.0,
                accepted: false,
                outcome: ValidationOutcome::SourceGone,
            };
        }
        Err(err) => {
            tracing::warn!(source = %source_id, error = %err, "validation incomplete");
            return ValidationVerdict {
                candidate,
                jaccard: 0.0,
                subset_coverage: 0.0,
                accepted: false,
                outcome: ValidationOutcome::Incomplete,
            };
        }
    };

    let source_units = split_unified_diff(&diff_text);
    let source = shingle_set(&normalize_units(&source_units, config), config.shingle_width);

    let jac = jaccard(&pr.combined, &source);
    let mut cover = coverage(&pr.combined, &source);
    for unit in &pr.per_unit {
        cover = cover.max(coverage(unit, &source));
    }

    let accepted = jac >= config.jaccard_threshold || cover >= config.jaccard_threshold;
    tracing::debug!(
        source = %source_id,
        jaccard = jac,
        coverage = cover,
        accepted,
        "layer 2 verdict"
    );
    ValidationVerdict {
        candidate,
        jaccard: jac,
        subset_coverage: cover,
        accepted,
        outcome: ValidationOutcome::Validated,
    }
}
