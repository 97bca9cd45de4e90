//! Sharded artifact retrieval from GitHub Actions.
//!
//! The repository's artifact list is filtered by name and creation time,
//! partitioned into shards, and each shard runs as its own tokio task:
//! download into a private temp directory, then unzip, parse, and merge
//! into the shared aggregator under one exclusive lock. Per-artifact
//! failures are logged and skipped; only a fully empty pass is fatal.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use regex::Regex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ReportConfig;
use crate::error::{AppError, AppResult};
use crate::github::{Artifact, RepositoryClient};
use crate::models::FlakeReport;
use crate::services::extraction;
use crate::services::unpack;

/// Whether an artifact's creation time falls inside the configured
/// window. The lower bound is inclusive, the upper bound exclusive.
fn in_window(artifact: &Artifact, config: &ReportConfig) -> bool {
    if let Some(from) = config.from {
        if artifact.created_at < from {
            return false;
        }
    }
    if let Some(to) = config.to {
        if artifact.created_at >= to {
            return false;
        }
    }
    true
}

/// Split `items` into at most `shards` chunks of near-equal size. Every
/// item lands in exactly one chunk and empty chunks are never produced.
fn partition<T>(mut items: Vec<T>, shards: usize) -> Vec<Vec<T>> {
    let shards = shards.max(1).min(items.len().max(1));
    let chunk = items.len().div_ceil(shards);
    let mut out = Vec::with_capacity(shards);
    while !items.is_empty() {
        let rest = items.split_off(chunk.min(items.len()));
        out.push(items);
        items = rest;
    }
    out
}

/// Download every artifact that passes the filters and merge its parsed
/// suites into `report`. Returns the number of artifacts successfully
/// downloaded; zero across all shards is [`AppError::NoArtifacts`].
pub async fn download_and_aggregate(
    client: Arc<RepositoryClient>,
    config: &ReportConfig,
    report: Arc<Mutex<FlakeReport>>,
) -> AppResult<usize> {
    let pattern = config.name_pattern();
    let name_filter = if pattern.is_empty() {
        None
    } else {
        Some(Regex::new(&pattern)?)
    };

    let artifacts = client.list_all_artifacts().await?;
    info!(
        total = artifacts.len(),
        owner = client.owner(),
        repo = client.repo(),
        "listed artifacts"
    );

    let selected: Vec<Artifact> = artifacts
        .into_iter()
        .filter(|a| {
            if a.expired {
                debug!(name = %a.name, "artifact expired");
                return false;
            }
            if !in_window(a, config) {
                debug!(name = %a.name, "artifact outside time window");
                return false;
            }
            match &name_filter {
                Some(filter) => filter.is_match(&a.name),
                None => true,
            }
        })
        .collect();

    if selected.is_empty() {
        return Err(AppError::NoArtifacts);
    }

    tokio::fs::create_dir_all(&config.download_dir).await?;

    let mut tasks = JoinSet::new();
    for shard in partition(selected, config.shards) {
        let client = Arc::clone(&client);
        let report = Arc::clone(&report);
        let download_dir = config.download_dir.clone();
        tasks.spawn(async move { run_shard(client, shard, download_dir, report).await });
    }

    // Drain every shard so no outcome is dropped; the first error wins
    // but only after all tasks have finished.
    let mut downloaded = 0usize;
    let mut first_error: Option<AppError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(count)) => downloaded += count,
            Ok(Err(e)) => {
                warn!("shard failed: {}", e);
                first_error.get_or_insert(e);
            }
            Err(e) => {
                let e = AppError::Pipeline(format!("shard task panicked: {}", e));
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    if downloaded == 0 {
        return Err(AppError::NoArtifacts);
    }
    Ok(downloaded)
}

/// One shard: download its artifacts into a fresh temp directory, then
/// unzip, parse, and merge under a single lock acquisition. The temp
/// directory is removed on every exit path.
async fn run_shard(
    client: Arc<RepositoryClient>,
    artifacts: Vec<Artifact>,
    download_dir: PathBuf,
    report: Arc<Mutex<FlakeReport>>,
) -> AppResult<usize> {
    let shard_dir = tempfile::Builder::new()
        .prefix("artifacts-")
        .tempdir_in(&download_dir)?;

    let mut downloaded: Vec<PathBuf> = Vec::new();
    for artifact in &artifacts {
        client.wait_for_quota().await;

        let file_name = if artifact.name.ends_with(".zip") {
            artifact.name.clone()
        } else {
            format!("{}.zip", artifact.name)
        };
        let dest = shard_dir.path().join(&file_name);
        match client.download_artifact(artifact.id, &dest).await {
            Ok(()) => {
                debug!(name = %artifact.name, "downloaded artifact");
                downloaded.push(dest);
            }
            Err(e) => warn!(name = %artifact.name, "download failed: {}", e),
        }
    }

    let count = downloaded.len();
    if count == 0 {
        return Ok(0);
    }

    // The lock spans the shard's whole unzip+parse+merge step; nothing
    // awaits while it is held.
    {
        let mut report = report
            .lock()
            .map_err(|_| AppError::Pipeline("aggregator lock poisoned".to_string()))?;
        for path in &downloaded {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let name = match unpack::ArtifactName::parse(file_name) {
                Ok(name) => name,
                Err(e) => {
                    warn!(file = file_name, "skipping artifact: {}", e);
                    continue;
                }
            };
            let payload = match unpack::unzip_concat(path) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(file = file_name, "skipping unreadable archive: {}", e);
                    continue;
                }
            };
            match extraction::parse_suites(&payload) {
                Ok(suites) => report.add_artifact(&suites, &name.commit),
                Err(e) => warn!(file = file_name, "skipping unparseable payload: {}", e),
            }
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn artifact(created_at: chrono::DateTime<Utc>) -> Artifact {
        Artifact {
            id: 1,
            name: "e2e-abc-1".to_string(),
            expired: false,
            created_at,
        }
    }

    #[test]
    fn test_window_bounds_are_inclusive_exclusive() {
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap();
        let config = ReportConfig {
            from: Some(from),
            to: Some(to),
            ..ReportConfig::default()
        };

        assert!(in_window(&artifact(from), &config));
        assert!(!in_window(&artifact(to), &config));
        assert!(in_window(
            &artifact(Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap()),
            &config,
        ));
        assert!(!in_window(
            &artifact(Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 59).unwrap()),
            &config,
        ));
    }

    #[test]
    fn test_open_ended_window_accepts_everything() {
        let config = ReportConfig::default();
        let when = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(in_window(&artifact(when), &config));
    }

    #[test]
    fn test_partition_covers_every_item_once() {
        let chunks = partition((0..10).collect(), 4);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        let mut flat: Vec<i32> = chunks.into_iter().flatten().collect();
        flat.sort_unstable();
        assert_eq!(flat, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_partition_never_exceeds_item_count() {
        let chunks = partition(vec![1, 2, 3], 8);
        assert_eq!(chunks.len(), 3);
        assert!(partition(Vec::<i32>::new(), 8).is_empty());
    }
}
