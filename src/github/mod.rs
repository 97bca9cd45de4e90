//! Minimal GitHub REST v3 client for Actions artifacts and pull requests.

pub mod client;
pub mod types;

pub use client::RepositoryClient;
pub use types::{Artifact, PullRequest, RateInfo};
