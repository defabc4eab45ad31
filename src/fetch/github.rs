//! GitHub diff fetcher — the production `DiffFetcher`
//!
//! Commit diffs come from the commits endpoint with the diff media type.
//! PR diffs are fetched as a compare of `base...head` rather than the PR
//! diff endpoint, so merge commits pushed after the fact do not pollute
//! the content stream.

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{DiffFetcher, FetchError};
use crate::store::SourceId;

const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("provena/", env!("CARGO_PKG_VERSION"));

pub struct GithubFetcher {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    token: Option<String>,
}

impl GithubFetcher {
    /// `repo` is `owner/name`; `token` an optional bearer token.
    pub fn new(repo: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: "https://api.github.com".to_string(),
            repo: repo.into(),
            token,
        }
    }

    /// Point at a different API host (GHES deployments, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", accept)
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(30));
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request to {url} failed: {e}")))?;
        classify_status(response)
    }

    async fn fetch_commit_diff(&self, sha: &str) -> Result<String, FetchError> {
        let url = format!("{}/repos/{}/commits/{}", self.api_base, self.repo, sha);
        let response = self.get(&url, DIFF_MEDIA_TYPE).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("reading commit diff: {e}")))
    }

    async fn fetch_pr_diff(&self, number: u64) -> Result<String, FetchError> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_base, self.repo, number);
        let response = self.get(&url, JSON_MEDIA_TYPE).await?;
        let info: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("decoding PR info: {e}")))?;
        let base = info["base"]["sha"]
            .as_str()
            .ok_or_else(|| FetchError::Transient("PR info missing base sha".into()))?;
        let head = info["head"]["sha"]
            .as_str()
            .ok_or_else(|| FetchError::Transient("PR info missing head sha".into()))?;

        let url = format!(
            "{}/repos/{}/compare/{}...{}",
            self.api_base, self.repo, base, head
        );
        let response = self.get(&url, DIFF_MEDIA_TYPE).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("reading compare diff: {e}")))
    }
}

#[async_trait]
impl DiffFetcher for GithubFetcher {
    async fn fetch(&self, id: &SourceId) -> Result<String, FetchError> {
        match id {
            SourceId::Commit(sha) => self.fetch_commit_diff(sha).await,
            SourceId::Pr(number) => self.fetch_pr_diff(*number).await,
        }
    }
}

/// Map an HTTP response onto the fetch error taxonomy.
fn classify_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 404 {
        return Err(FetchError::NotFound);
    }
    if status.as_u16() == 429 || status.as_u16() == 403 {
        return Err(FetchError::RateLimited {
            retry_after: rate_limit_hint(&response),
        });
    }
    if status.is_server_error() {
        return Err(FetchError::Transient(format!("HTTP {status}")));
    }
    Err(FetchError::Transient(format!("unexpected HTTP {status}")))
}

/// Derive a backoff hint from `Retry-After` or `X-RateLimit-Reset`.
fn rate_limit_hint(response: &reqwest::Response) -> Option<Duration> {
    let headers = response.headers();
    if let Some(seconds) = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Some(Duration::from_secs(seconds));
    }
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(Duration::from_secs(reset.saturating_sub(now) + 1))
}
