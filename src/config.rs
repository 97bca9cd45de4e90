//! Immutable run configuration assembled by the CLI layer.
//!
//! A configuration value is constructed once, validated once, and passed by
//! reference into the pipeline entry points. Nothing mutates it afterwards.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};

/// Number of parallel shards the artifact list is partitioned into.
pub const DEFAULT_SHARD_COUNT: usize = 8;

/// Artifact name under which commenter progress is stored.
pub const DEFAULT_LEDGER_ARTIFACT: &str = "flake-bot-progress";

/// Local path the commenter progress file is written to.
pub const DEFAULT_PROGRESS_FILE: &str = "./commenter_progress_file.yaml";

/// Configuration for one report pass over a repository's artifacts.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Personal access token for the repository
    pub token: String,
    /// Only include artifacts created at or after this instant
    pub from: Option<DateTime<Utc>>,
    /// Only include artifacts created strictly before this instant
    pub to: Option<DateTime<Utc>>,
    /// Test suite name filter (free-form regex term)
    pub test_suite_filter: String,
    /// Commit SHA filter; multiple SHAs joined with `|`
    pub commit_filter: String,
    /// Restrict the pass to artifacts produced by this pull request
    pub pull_request: Option<u64>,
    /// Where to write the generated YAML report; stdout only when unset
    pub report_file: Option<PathBuf>,
    /// Directory artifacts are temporarily downloaded into
    pub download_dir: PathBuf,
    /// Import zipped artifacts from a local directory instead of GitHub
    pub import_dir: Option<PathBuf>,
    /// Block on quota exhaustion until the API rate limit resets
    pub wait_for_quota_reset: bool,
    /// Degree of download parallelism
    pub shards: usize,
}

impl ReportConfig {
    /// Validate the configuration the way the pipeline requires it.
    ///
    /// Owner, repo, and token are mandatory unless a local import directory
    /// is supplied, in which case GitHub is never contacted.
    pub fn validate(&self) -> AppResult<()> {
        if (self.owner.is_empty() || self.repo.is_empty()) && self.import_dir.is_none() {
            return Err(AppError::Config(
                "supply either owner and repository name or a local artifact directory"
                    .to_string(),
            ));
        }

        if !self.owner.is_empty() && !self.repo.is_empty() && self.token.is_empty() {
            return Err(AppError::Config(format!(
                "supply a token for pulling artifacts from {}/{}",
                self.owner, self.repo
            )));
        }

        if self.shards == 0 {
            return Err(AppError::Config("shard count must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Combined artifact name pattern from the suite and commit filters.
    ///
    /// Both set: `<suite>-(<commit-alternation>)` so a commit list matches as
    /// a regex alternation right after the suite segment. Otherwise plain
    /// concatenation, which degrades to whichever one is present.
    pub fn name_pattern(&self) -> String {
        if !self.test_suite_filter.is_empty() && !self.commit_filter.is_empty() {
            format!("{}-({})", self.test_suite_filter, self.commit_filter)
        } else {
            format!("{}{}", self.test_suite_filter, self.commit_filter)
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            owner: String::new(),
            repo: String::new(),
            token: String::new(),
            from: None,
            to: None,
            test_suite_filter: String::new(),
            commit_filter: String::new(),
            pull_request: None,
            report_file: None,
            download_dir: PathBuf::from("./"),
            import_dir: None,
            wait_for_quota_reset: false,
            shards: DEFAULT_SHARD_COUNT,
        }
    }
}

/// A repository the commenter tracks for new CI run activity.
#[derive(Debug, Clone)]
pub struct TrackedRepo {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Personal access token for the repository
    pub token: String,
    /// Artifact name matcher selecting which test suites are reported on
    pub test_name_matcher: String,
}

/// Configuration for a commenter pass across tracked repositories.
#[derive(Debug, Clone)]
pub struct CommenterConfig {
    /// Owner of the repository hosting the progress ledger
    pub ledger_owner: String,
    /// Name of the repository hosting the progress ledger
    pub ledger_repo: String,
    /// Token for the ledger repository
    pub ledger_token: String,
    /// Name of the artifact the ledger is persisted under
    pub artifact_name: String,
    /// Local path the updated ledger is written to
    pub progress_file: PathBuf,
    /// Directory used for temporary downloads during report passes
    pub download_dir: PathBuf,
    /// Repositories to select work from
    pub repos: Vec<TrackedRepo>,
}

impl CommenterConfig {
    /// Validate ledger access and every tracked repository.
    pub fn validate(&self) -> AppResult<()> {
        if self.ledger_owner.is_empty() || self.ledger_repo.is_empty() || self.ledger_token.is_empty()
        {
            return Err(AppError::Config(
                "commenting requires ledger owner, repo, and token to be not empty".to_string(),
            ));
        }

        for tracked in &self.repos {
            if tracked.owner.is_empty() || tracked.repo.is_empty() || tracked.token.is_empty() {
                return Err(AppError::Config(
                    "commenting requires owner, repo, and token to be not empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_repo_or_import_dir() {
        let config = ReportConfig::default();
        assert!(config.validate().is_err());

        let config = ReportConfig {
            import_dir: Some(PathBuf::from("./zips")),
            ..ReportConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_token_with_repo() {
        let config = ReportConfig {
            owner: "operator-framework".to_string(),
            repo: "operator-lifecycle-manager".to_string(),
            ..ReportConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ReportConfig {
            token: "ghp_test".to_string(),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_name_pattern_combines_suite_and_commits() {
        let config = ReportConfig {
            test_suite_filter: "e2e-test-output".to_string(),
            commit_filter: "abc123|def456".to_string(),
            ..ReportConfig::default()
        };
        assert_eq!(config.name_pattern(), "e2e-test-output-(abc123|def456)");
    }

    #[test]
    fn test_name_pattern_single_filter() {
        let config = ReportConfig {
            test_suite_filter: "e2e-test-output".to_string(),
            ..ReportConfig::default()
        };
        assert_eq!(config.name_pattern(), "e2e-test-output");

        let config = ReportConfig {
            commit_filter: "abc123".to_string(),
            ..ReportConfig::default()
        };
        assert_eq!(config.name_pattern(), "abc123");
    }

    #[test]
    fn test_commenter_validate() {
        let config = CommenterConfig {
            ledger_owner: "operator-framework".to_string(),
            ledger_repo: "flake-reporter".to_string(),
            ledger_token: "ghp_test".to_string(),
            artifact_name: DEFAULT_LEDGER_ARTIFACT.to_string(),
            progress_file: PathBuf::from(DEFAULT_PROGRESS_FILE),
            download_dir: PathBuf::from("./"),
            repos: vec![TrackedRepo {
                owner: "operator-framework".to_string(),
                repo: "olm".to_string(),
                token: String::new(),
                test_name_matcher: "e2e".to_string(),
            }],
        };
        assert!(config.validate().is_err());

        let mut config = config;
        config.repos[0].token = "ghp_test".to_string();
        assert!(config.validate().is_ok());
    }
}
