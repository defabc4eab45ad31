//! Triage prefilters — cheap rejection before any fingerprinting
//!
//! Most PRs are not provenance risks, and the expensive layers should
//! never see them. Triage drops diffs that are too small to fingerprint
//! meaningfully and diffs that are dominated by relocated lines (code
//! movement), which fingerprint like their source but carry no copied
//! content.

use crate::config::ProvenaConfig;
use crate::diff::{changed_line_count, movement_stats, DiffUnit};
use crate::normalize::NormalizedDiff;

/// Why a diff did or did not survive triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageOutcome {
    Proceed,
    /// Too few normalized tokens to fingerprint
    TooFewTokens,
    /// Too few changed lines to matter
    TooFewLines,
    /// Mostly relocated lines or negligible net new content
    CodeMovement,
}

impl TriageOutcome {
    pub fn is_trivial(self) -> bool {
        self != TriageOutcome::Proceed
    }
}

/// Run the prefilters over an already-normalized diff.
pub fn triage(
    units: &[DiffUnit],
    normalized: &NormalizedDiff,
    config: &ProvenaConfig,
) -> TriageOutcome {
    if normalized.token_count() < config.min_tokens {
        return TriageOutcome::TooFewTokens;
    }
    if changed_line_count(units) < config.min_lines {
        return TriageOutcome::TooFewLines;
    }
    let stats = movement_stats(units);
    if stats.net_new_lines < config.min_net_new_lines
        || stats.movement_ratio >= config.movement_threshold
    {
        return TriageOutcome::CodeMovement;
    }
    TriageOutcome::Proceed
}

/// Infrastructure files (CI config, vendored deps, docs) are excluded
/// from candidate generation; their churn tracks upstream by necessity.
pub fn is_infrastructure(path: &str, config: &ProvenaConfig) -> bool {
    config
        .infrastructure_patterns
        .iter()
        .any(|pattern| path.contains(pattern.as_str()))
}
