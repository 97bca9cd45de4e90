//! Repository-scoped GitHub client.
//!
//! Wraps reqwest with the handful of Actions and pull request endpoints the
//! analyzer needs: paginated artifact listing, zip download, paginated PR and
//! commit listing, and comment creation. Every response's rate-limit headers
//! are recorded so the retrieval pipeline can throttle before downloads.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::github::types::{Artifact, ArtifactListing, PullCommit, PullRequest, RateInfo};

/// GitHub REST API base URL.
const GITHUB_API: &str = "https://api.github.com";

/// HTTP connect timeout for GitHub API calls.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Page size for paginated listings.
const PER_PAGE: u32 = 100;

/// Extra wait after the reported quota reset instant.
const QUOTA_GRACE: Duration = Duration::from_secs(5);

/// Client scoped to a single `owner/repo`.
pub struct RepositoryClient {
    http: reqwest::Client,
    owner: String,
    repo: String,
    token: String,
    wait_for_quota_reset: bool,
    rate: Mutex<RateInfo>,
}

impl RepositoryClient {
    /// Build a client for one repository. The token may be empty for
    /// unauthenticated listing, but downloads require authentication.
    pub fn new(
        token: &str,
        owner: &str,
        repo: &str,
        wait_for_quota_reset: bool,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .user_agent(concat!("ci-flake-reporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Github(format!("failed to build HTTP client: {}", e)))?;

        Ok(RepositoryClient {
            http,
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
            wait_for_quota_reset,
            rate: Mutex::new(RateInfo::default()),
        })
    }

    /// Repository owner this client is scoped to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name this client is scoped to.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    /// Record the rate-limit headers of the most recent response.
    fn record_rate(&self, headers: &HeaderMap) {
        let remaining = header_u64(headers, "x-ratelimit-remaining");
        let reset_at = header_u64(headers, "x-ratelimit-reset")
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0));

        if let Ok(mut rate) = self.rate.lock() {
            rate.remaining = remaining;
            rate.reset_at = reset_at;
        }
    }

    /// Quota as of the last API response.
    pub fn last_rate(&self) -> RateInfo {
        self.rate.lock().map(|r| *r).unwrap_or_default()
    }

    /// Block until the API quota resets, plus a grace period.
    ///
    /// No-op unless the client was built with `wait_for_quota_reset` and the
    /// last response reported an exhausted quota. A plain wait, not a retry:
    /// the caller proceeds exactly once afterwards.
    pub async fn wait_for_quota(&self) {
        if !self.wait_for_quota_reset {
            return;
        }
        let rate = self.last_rate();
        if !rate.exhausted() {
            return;
        }

        let until_reset = rate
            .reset_at
            .and_then(|reset| (reset - Utc::now()).to_std().ok())
            .unwrap_or_default();
        info!(
            "Waiting {}s for GitHub quota reset",
            until_reset.as_secs() + QUOTA_GRACE.as_secs()
        );
        tokio::time::sleep(until_reset + QUOTA_GRACE).await;
    }

    /// List every artifact of the repository across all pages.
    ///
    /// Exposes the expiry flag, creation time, name, and id of each artifact;
    /// rate-limit metadata is captured as a side effect.
    pub async fn list_all_artifacts(&self) -> AppResult<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        let mut page: u32 = 1;

        loop {
            let url = format!(
                "{}/repos/{}/{}/actions/artifacts?per_page={}&page={}",
                GITHUB_API, self.owner, self.repo, PER_PAGE, page
            );
            let resp = self.get(&url).send().await?;
            self.record_rate(resp.headers());
            let listing: ArtifactListing = resp.error_for_status()?.json().await?;

            let fetched = listing.artifacts.len();
            artifacts.extend(listing.artifacts);
            if fetched < PER_PAGE as usize {
                break;
            }
            page += 1;
        }

        Ok(artifacts)
    }

    /// Download one artifact's zip payload to `dest`.
    ///
    /// The endpoint answers with a redirect to short-lived storage; reqwest
    /// follows it and the body is streamed to disk.
    pub async fn download_artifact(&self, artifact_id: u64, dest: &Path) -> AppResult<()> {
        let url = format!(
            "{}/repos/{}/{}/actions/artifacts/{}/zip",
            GITHUB_API, self.owner, self.repo, artifact_id
        );
        let resp = self.get(&url).send().await?;
        self.record_rate(resp.headers());
        let resp = resp.error_for_status()?;

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            AppError::FileSystem(format!("failed to create {}: {}", dest.display(), e))
        })?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    /// List all open pull requests, most recently updated first.
    pub async fn list_open_pulls(&self) -> AppResult<Vec<PullRequest>> {
        let mut pulls = Vec::new();
        let mut page: u32 = 1;

        loop {
            let url = format!(
                "{}/repos/{}/{}/pulls?state=open&sort=updated&direction=desc&per_page={}&page={}",
                GITHUB_API, self.owner, self.repo, PER_PAGE, page
            );
            let resp = self.get(&url).send().await?;
            self.record_rate(resp.headers());
            let batch: Vec<PullRequest> = resp.error_for_status()?.json().await?;

            let fetched = batch.len();
            pulls.extend(batch);
            if fetched < PER_PAGE as usize {
                break;
            }
            page += 1;
        }

        Ok(pulls)
    }

    /// List the commit SHAs of one pull request across all pages.
    pub async fn list_pull_commits(&self, number: u64) -> AppResult<Vec<String>> {
        let mut commits = Vec::new();
        let mut page: u32 = 1;

        loop {
            let url = format!(
                "{}/repos/{}/{}/pulls/{}/commits?per_page={}&page={}",
                GITHUB_API, self.owner, self.repo, number, PER_PAGE, page
            );
            let resp = self.get(&url).send().await?;
            self.record_rate(resp.headers());
            let batch: Vec<PullCommit> = resp.error_for_status()?.json().await?;

            let fetched = batch.len();
            commits.extend(batch.into_iter().map(|c| c.sha));
            if fetched < PER_PAGE as usize {
                break;
            }
            page += 1;
        }

        Ok(commits)
    }

    /// Post a comment on a pull request. Single call, no retry contract.
    pub async fn create_comment(&self, number: u64, body: &str) -> AppResult<()> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            GITHUB_API, self.owner, self.repo, number
        );
        let resp = self
            .http
            .post(&url)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        self.record_rate(resp.headers());
        resp.error_for_status()?;

        Ok(())
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}
