//! Domain error types for the flake reporter.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use std::path::PathBuf;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// GitHub API call failed
    #[error("GitHub API error: {0}")]
    Github(String),

    /// Filesystem operation failed
    #[error("Filesystem error: {0}")]
    FileSystem(String),

    /// Zip archive could not be read
    #[error("Archive error: {0}")]
    Archive(String),

    /// JUnit payload could not be parsed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Report or ledger (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Artifact name does not follow `<suite>-<commit>-<runID>`
    #[error("Artifact name '{0}' does not follow <test-name>-<commit>-<run-id>")]
    InvalidArtifactName(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No artifact was downloaded by any shard
    #[error("no artifact has been downloaded")]
    NoArtifacts,

    /// Distinguished non-error outcome: empty report, nothing to post
    #[error("no error in test to report")]
    NothingToReport,

    /// Shard task failed to run to completion
    #[error("Retrieval pipeline error: {0}")]
    Pipeline(String),

    /// Local import directory is missing or unreadable
    #[error("Import directory {0:?} unreadable: {1}")]
    ImportDir(PathBuf, String),
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Github(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileSystem(err.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        AppError::Archive(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::InvalidInput(format!("Invalid filter pattern: {}", err))
    }
}
