//! Diff fetch capability — the Layer 2 boundary
//!
//! Deep validation needs the authoritative source diff, fetched fresh at
//! check time. The boundary is an abstract capability (identifier →
//! diff-or-typed-error) so the concurrency and retry harness never touches
//! matching logic, and tests substitute canned fetchers freely.
//!
//! `NotFound` is a first-class, benign outcome: a deleted or rebased
//! source identifier means "no match for this candidate", never a failure.

pub mod github;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::store::SourceId;

pub use github::GithubFetcher;

/// Typed failure modes at the fetch boundary.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The source identifier no longer resolves (deleted/rebased).
    #[error("source not found")]
    NotFound,

    /// The API asked us to back off.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// 5xx, network failure, or any other retryable condition.
    #[error("transient fetch failure: {0}")]
    Transient(String),
}

/// Supplies the authoritative diff text for an upstream change.
#[async_trait]
pub trait DiffFetcher: Send + Sync {
    async fn fetch(&self, id: &SourceId) -> Result<String, FetchError>;
}

/// Backoff ceiling; a rate-limit reset further out than this is hopeless
/// within one check.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Fetch with bounded retries and exponential backoff.
///
/// `NotFound` returns immediately — retrying a vanished source cannot
/// succeed. Rate limits honor the server's hint when one is present.
pub async fn fetch_with_retry(
    fetcher: &dyn DiffFetcher,
    id: &SourceId,
    attempts: u32,
) -> Result<String, FetchError> {
    let attempts = attempts.max(1);
    let mut last = FetchError::Transient("no attempts made".into());

    for attempt in 0..attempts {
        match fetcher.fetch(id).await {
            Ok(text) => return Ok(text),
            Err(FetchError::NotFound) => return Err(FetchError::NotFound),
            Err(err) => {
                if attempt + 1 < attempts {
                    let delay = match &err {
                        FetchError::RateLimited {
                            retry_after: Some(hint),
                        } => (*hint).min(MAX_BACKOFF),
                        _ => Duration::from_secs(1u64 << attempt).min(MAX_BACKOFF),
                    };
                    tracing::debug!(source = %id, attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
                    tokio::time::sleep(delay).await;
                }
                last = err;
            }
        }
    }
    Err(last)
}
