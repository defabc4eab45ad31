//! Provenance check orchestrator
//!
//! Sequences the pipeline: triage → Layer 1 candidate generation →
//! Layer 2 deep validation → one pass/fail decision with evidence.
//!
//! Layer 2 runs under bounded parallelism to respect API rate limits;
//! the `matched` outcome is a pure reduction over the verdict set, so it
//! is independent of validation completion order. Evidence is sorted by
//! jaccard descending afterwards for reporting. If the configured
//! deadline expires, in-flight fetches are abandoned and the report
//! carries the partial evidence tagged incomplete — never a silent
//! false negative.

pub mod candidates;
pub mod triage;
pub mod validate;

pub use candidates::{MatchCandidate, MatchKind};
pub use triage::TriageOutcome;
pub use validate::{PrShingles, ValidationOutcome, ValidationVerdict};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ProvenaConfig;
use crate::diff::{filter_rebranding, split_unified_diff, DiffUnit};
use crate::fetch::DiffFetcher;
use crate::normalize::normalize_units;
use crate::store::FingerprintStore;
use crate::ProvenaResult;

/// Outcome of one provenance check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    /// True when any candidate validated as accepted
    pub matched: bool,
    /// Per-candidate verdicts, best jaccard first
    pub evidence: Vec<ValidationVerdict>,
    /// True when the deadline expired or any candidate could not be
    /// validated; absence of a match is then not conclusive
    pub incomplete: bool,
}

impl CheckReport {
    fn no_match() -> Self {
        Self {
            matched: false,
            evidence: Vec::new(),
            incomplete: false,
        }
    }
}

/// The provenance check engine.
pub struct ProvenaEngine {
    config: ProvenaConfig,
}

impl ProvenaEngine {
    /// Build an engine, rejecting malformed configuration before any
    /// fingerprinting can run.
    pub fn new(config: ProvenaConfig) -> ProvenaResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProvenaConfig {
        &self.config
    }

    /// Check a raw unified diff. Rebranding-only hunks are filtered
    /// before decomposition.
    pub async fn check_diff_text(
        &self,
        diff_text: &str,
        store: &FingerprintStore,
        fetcher: Arc<dyn DiffFetcher>,
    ) -> CheckReport {
        let filtered = filter_rebranding(diff_text, &self.config);
        let units = split_unified_diff(&filtered);
        self.check(&units, store, fetcher).await
    }

    /// Check an already-decomposed unit set.
    pub async fn check(
        &self,
        units: &[DiffUnit],
        store: &FingerprintStore,
        fetcher: Arc<dyn DiffFetcher>,
    ) -> CheckReport {
        let work: Vec<DiffUnit> = units
            .iter()
            .filter(|u| !triage::is_infrastructure(&u.path, &self.config))
            .cloned()
            .collect();

        let normalized = normalize_units(&work, &self.config);
        if normalized.degraded {
            tracing::warn!("no grammar for part of this diff; matching at reduced precision");
        }

        let outcome = triage::triage(&work, &normalized, &self.config);
        if outcome.is_trivial() {
            tracing::info!(?outcome, "diff is trivial; skipping fingerprint layers");
            return CheckReport::no_match();
        }

        let mut candidates = candidates::generate(&work, store, &self.config);
        if candidates.is_empty() {
            tracing::info!("layer 1 produced no candidates");
            return CheckReport::no_match();
        }
        if candidates.len() > self.config.max_candidates {
            tracing::debug!(
                dropped = candidates.len() - self.config.max_candidates,
                "capping candidates forwarded to layer 2"
            );
            candidates.truncate(self.config.max_candidates);
        }
        tracing::info!(candidates = candidates.len(), "validating layer 1 candidates");

        let pr = Arc::new(PrShingles::build(&work, &self.config));
        let semaphore = Arc::new(Semaphore::new(self.config.validation_concurrency));
        let mut tasks: JoinSet<ValidationVerdict> = JoinSet::new();
        for candidate in candidates {
            let pr = Arc::clone(&pr);
            let fetcher = Arc::clone(&fetcher);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                validate::validate(candidate, &pr, fetcher.as_ref(), &config).await
            });
        }

        let deadline = self
            .config
            .deadline_ms
            .map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));
        let mut evidence: Vec<ValidationVerdict> = Vec::new();
        let mut deadline_expired = false;

        loop {
            let joined = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(
                            pending = tasks.len(),
                            "deadline expired; abandoning in-flight validations"
                        );
                        deadline_expired = true;
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            match joined {
                Some(Ok(verdict)) => evidence.push(verdict),
                Some(Err(join_error)) => {
                    // An isolated validation failure must not abort the rest.
                    tracing::error!(error = %join_error, "validation task failed");
                    deadline_expired = true;
                }
                None => break,
            }
        }

        let incomplete = deadline_expired
            || evidence
                .iter()
                .any(|v| v.outcome == ValidationOutcome::Incomplete);
        evidence.sort_by(|a, b| {
            b.jaccard
                .total_cmp(&a.jaccard)
                .then_with(|| a.candidate.record.source_id.cmp(&b.candidate.record.source_id))
        });
        let matched = evidence.iter().any(|v| v.accepted);

        tracing::info!(matched, evidence = evidence.len(), incomplete, "check complete");
        CheckReport {
            matched,
            evidence,
            incomplete,
        }
    }
}
