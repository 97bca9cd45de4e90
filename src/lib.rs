//! CI flakiness reporting library.
//!
//! Aggregates JUnit test artifacts uploaded by GitHub Actions workflows
//! into per-test flake reports, and drives a commenting bot that posts
//! those reports to open pull requests exactly once per workflow run.

pub mod config;
pub mod error;
pub mod github;
pub mod models;
pub mod services;

pub use config::{CommenterConfig, ReportConfig, TrackedRepo};
pub use error::{AppError, AppResult};
pub use models::FlakeReport;
