//! Wire models for the GitHub Actions and pull request endpoints.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One artifact produced by a workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    /// Artifact ID used for the download endpoint
    pub id: u64,
    /// Artifact name, conventionally `<suite>-<commit>-<runID>`
    pub name: String,
    /// Whether the retention window has elapsed; expired artifacts cannot be downloaded
    #[serde(default)]
    pub expired: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Paginated artifact listing response.
#[derive(Debug, Deserialize)]
pub struct ArtifactListing {
    pub total_count: u64,
    pub artifacts: Vec<Artifact>,
}

/// An open pull request; only the number is needed for correlation.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
}

/// One commit in a pull request's commit listing.
#[derive(Debug, Deserialize)]
pub struct PullCommit {
    pub sha: String,
}

/// API quota as reported by the last response's rate-limit headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateInfo {
    /// Remaining requests in the current window
    pub remaining: Option<u64>,
    /// Instant at which the window resets
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateInfo {
    /// True when the quota is known to be exhausted.
    pub fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}
