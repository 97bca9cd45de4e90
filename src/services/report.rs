//! Report generation: sorting, YAML rendering, and the PR comment body.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ReportConfig;
use crate::error::{AppError, AppResult};
use crate::github::RepositoryClient;
use crate::models::{FlakeReport, TestEntry};
use crate::services::{extraction, retrieval, unpack};

/// Build an aggregated report for the configured repository, either from
/// a local directory of zipped artifacts or by downloading from GitHub.
/// The returned report still needs [`generate`] before rendering.
pub async fn load_report(config: &ReportConfig) -> AppResult<FlakeReport> {
    config.validate()?;

    if let Some(dir) = &config.import_dir {
        return import_local(config, dir);
    }

    let client = Arc::new(RepositoryClient::new(
        &config.token,
        &config.owner,
        &config.repo,
        config.wait_for_quota_reset,
    )?);

    let mut effective = config.clone();
    if let Some(number) = config.pull_request {
        let commits = client.list_pull_commits(number).await?;
        info!(pull = number, commits = commits.len(), "restricting to pull request commits");
        let mut all: Vec<String> = if effective.commit_filter.is_empty() {
            Vec::new()
        } else {
            effective.commit_filter.split('|').map(String::from).collect()
        };
        all.extend(commits);
        effective.commit_filter = all.join("|");
    }

    let report = Arc::new(Mutex::new(FlakeReport::new()));
    let downloaded =
        retrieval::download_and_aggregate(client, &effective, Arc::clone(&report)).await?;
    info!(downloaded, "aggregated downloaded artifacts");

    Arc::try_unwrap(report)
        .map_err(|_| AppError::Pipeline("aggregator still shared after join".to_string()))?
        .into_inner()
        .map_err(|_| AppError::Pipeline("aggregator lock poisoned".to_string()))
}

/// Aggregate zipped artifacts already present on disk.
fn import_local(config: &ReportConfig, dir: &Path) -> AppResult<FlakeReport> {
    let pattern = config.name_pattern();
    let filter = if pattern.is_empty() {
        None
    } else {
        Some(regex::Regex::new(&pattern)?)
    };

    let loaded = unpack::load_zipped_artifacts(dir, filter.as_ref())?;
    if loaded.is_empty() {
        return Err(AppError::NoArtifacts);
    }

    let mut report = FlakeReport::new();
    for artifact in &loaded {
        match extraction::parse_suites(&artifact.payload) {
            Ok(suites) => report.add_artifact(&suites, &artifact.name.commit),
            Err(e) => warn!(commit = %artifact.name.commit, "skipping unparseable payload: {}", e),
        }
    }
    info!(imported = loaded.len(), dir = %dir.display(), "imported local artifacts");
    Ok(report)
}

/// Populate the report's sorted output arrays and counts from the
/// aggregation maps. A report with neither flaky nor skipped tests is
/// [`AppError::NothingToReport`].
pub fn generate(report: &mut FlakeReport) -> AppResult<()> {
    report.flake_tests = sorted_entries(report.flake_map.values());
    report.skipped_tests = sorted_entries(report.skipped_map.values());
    report.flake_test_count = report.flake_tests.len();
    report.skipped_test_count = report.skipped_tests.len();

    if report.flake_tests.is_empty() && report.skipped_tests.is_empty() {
        return Err(AppError::NothingToReport);
    }
    Ok(())
}

/// Most frequent first; ties broken by how many commits the failures
/// spread across, then by name for stable output.
fn sorted_entries<'a, I>(entries: I) -> Vec<TestEntry>
where
    I: Iterator<Item = &'a TestEntry>,
{
    let mut sorted: Vec<TestEntry> = entries.cloned().collect();
    sorted.sort_by(|a, b| {
        b.counts
            .cmp(&a.counts)
            .then_with(|| b.commits.len().cmp(&a.commits.len()))
            .then_with(|| a.class_name.cmp(&b.class_name))
            .then_with(|| a.name.cmp(&b.name))
    });
    sorted
}

/// Serialize the full generated report to YAML.
pub fn render_yaml(report: &FlakeReport) -> AppResult<String> {
    Ok(serde_yaml::to_string(report)?)
}

/// Write the rendered report, creating parent directories as needed. No
/// path means stdout.
pub fn write_report(yaml: &str, path: Option<&Path>) -> AppResult<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, yaml)?;
            info!(path = %path.display(), "wrote report");
        }
        None => println!("{}", yaml),
    }
    Ok(())
}

// ===== Condensed views =====

#[derive(Debug, Serialize)]
struct CondensedReport {
    total_test_count: usize,
    flake_test_count: usize,
    skipped_test_count: usize,
    flake_tests: Vec<CondensedEntry>,
    skipped_tests: Vec<CondensedEntry>,
}

#[derive(Debug, Serialize)]
struct CondensedEntry {
    class_name: String,
    name: String,
    counts: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<CondensedDetail>,
    mean_duration_sec: f64,
}

#[derive(Debug, Serialize)]
struct CondensedDetail {
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn condense(entry: &TestEntry, decorate: bool) -> CondensedEntry {
    CondensedEntry {
        class_name: entry.class_name.clone(),
        name: if decorate {
            format!("**{}**", entry.name)
        } else {
            entry.name.clone()
        },
        counts: entry.counts,
        details: entry
            .details
            .iter()
            .map(|d| CondensedDetail {
                count: d.count,
                error: if decorate {
                    d.error.as_ref().map(|e| format!("\n\n{}", e))
                } else {
                    d.error.clone()
                },
            })
            .collect(),
        mean_duration_sec: entry.mean_duration_sec,
    }
}

/// Short report: per-test error details only, no commit lists and no
/// captured output streams.
pub fn render_short(report: &FlakeReport) -> AppResult<String> {
    let short = CondensedReport {
        total_test_count: report.total_test_count,
        flake_test_count: report.flake_test_count,
        skipped_test_count: report.skipped_test_count,
        flake_tests: report.flake_tests.iter().map(|e| condense(e, false)).collect(),
        skipped_tests: report
            .skipped_tests
            .iter()
            .map(|e| condense(e, false))
            .collect(),
    };
    Ok(serde_yaml::to_string(&short)?)
}

/// The PR comment: one summary sentence plus the condensed report inside
/// a collapsed `<details>` block, test names bolded.
pub fn render_comment(report: &FlakeReport) -> AppResult<String> {
    if report.flake_tests.is_empty() && report.skipped_tests.is_empty() {
        return Err(AppError::NothingToReport);
    }

    let condensed = CondensedReport {
        total_test_count: report.total_test_count,
        flake_test_count: report.flake_test_count,
        skipped_test_count: report.skipped_test_count,
        flake_tests: report.flake_tests.iter().map(|e| condense(e, true)).collect(),
        skipped_tests: report
            .skipped_tests
            .iter()
            .map(|e| condense(e, true))
            .collect(),
    };
    let yaml = serde_yaml::to_string(&condensed)?;

    Ok(format!(
        "This PR **failed tests for {} times** with {} individual failed tests and {} skipped tests. \
         A test is considered flaky if failed on multiple commits. \n<details>\n\n {}",
        report.total_test_count, report.flake_test_count, report.skipped_test_count, yaml
    ))
}
