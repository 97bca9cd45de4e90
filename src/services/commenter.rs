//! Flake commenting across tracked repositories.
//!
//! A progress ledger, itself stored as an artifact in a dedicated
//! repository, records which workflow runs each repository has already
//! been commented for. Per tracked repository the open PRs are matched
//! against uploaded artifacts by commit, and every PR with uncovered runs
//! gets one fresh report comment. The ledger entry is then replaced with
//! the snapshot of run IDs observed in this pass.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{CommenterConfig, ReportConfig, TrackedRepo};
use crate::error::{AppError, AppResult};
use crate::github::RepositoryClient;
use crate::models::{LedgerEntry, ProgressLedger, WorkItem};
use crate::services::{report, unpack};

/// One full commenting pass over every tracked repository.
pub async fn run_commenter(config: &CommenterConfig) -> AppResult<()> {
    config.validate()?;

    let ledger_client = RepositoryClient::new(
        &config.ledger_token,
        &config.ledger_owner,
        &config.ledger_repo,
        false,
    )?;
    let mut ledger = load_ledger(&ledger_client, config).await?;

    for tracked in &config.repos {
        process_repo(tracked, config, &mut ledger).await?;
    }

    persist_ledger(&ledger, &config.progress_file)
}

/// Fetch the newest ledger artifact from the ledger repository. A missing
/// artifact means a first run and yields an empty ledger; a ledger that
/// exists but does not deserialize is fatal.
async fn load_ledger(
    client: &RepositoryClient,
    config: &CommenterConfig,
) -> AppResult<ProgressLedger> {
    let artifacts = client.list_all_artifacts().await?;
    let newest = artifacts
        .into_iter()
        .filter(|a| !a.expired && a.name == config.artifact_name)
        .max_by_key(|a| a.created_at);

    let Some(artifact) = newest else {
        info!(name = %config.artifact_name, "no ledger artifact found, starting empty");
        return Ok(ProgressLedger::default());
    };

    tokio::fs::create_dir_all(&config.download_dir).await?;
    let dir = tempfile::Builder::new()
        .prefix("ledger-")
        .tempdir_in(&config.download_dir)?;
    let dest = dir.path().join(format!("{}.zip", artifact.name));
    client.download_artifact(artifact.id, &dest).await?;

    let payload = unpack::unzip_concat(&dest)?;
    let ledger: ProgressLedger = serde_yaml::from_slice(&payload)?;
    info!(
        entries = ledger.commented.len(),
        created = %artifact.created_at,
        "loaded progress ledger"
    );
    Ok(ledger)
}

/// Decide which PRs need a comment. Returns the work items plus the run
/// IDs observed across all PRs; the caller replaces the ledger entry with
/// that snapshot. A PR whose run IDs the entry already covers is skipped,
/// and a PR with no matching artifacts is covered vacuously.
fn select_work(
    prs: &[(u64, Vec<String>)],
    runs_by_commit: &HashMap<String, Vec<String>>,
    entry: &LedgerEntry,
) -> (Vec<WorkItem>, BTreeSet<String>) {
    let mut observed = BTreeSet::new();
    let mut items = Vec::new();

    for (number, commits) in prs {
        let mut run_ids: Vec<String> = Vec::new();
        for commit in commits {
            if let Some(runs) = runs_by_commit.get(commit) {
                for run in runs {
                    if !run_ids.contains(run) {
                        run_ids.push(run.clone());
                    }
                }
            }
        }
        observed.extend(run_ids.iter().cloned());

        if entry.covers(&run_ids) {
            debug!(pull = number, "already commented for these runs");
            continue;
        }
        items.push(WorkItem {
            number: *number,
            commits: commits.clone(),
            run_ids,
        });
    }
    (items, observed)
}

async fn process_repo(
    tracked: &TrackedRepo,
    config: &CommenterConfig,
    ledger: &mut ProgressLedger,
) -> AppResult<()> {
    let client = Arc::new(RepositoryClient::new(
        &tracked.token,
        &tracked.owner,
        &tracked.repo,
        false,
    )?);

    let name_filter = if tracked.test_name_matcher.is_empty() {
        None
    } else {
        Some(Regex::new(&tracked.test_name_matcher)?)
    };

    // Index run IDs by commit from the artifact naming convention;
    // malformed names carry no commit and are skipped.
    let mut runs_by_commit: HashMap<String, Vec<String>> = HashMap::new();
    for artifact in client.list_all_artifacts().await? {
        if artifact.expired {
            continue;
        }
        if let Some(filter) = &name_filter {
            if !filter.is_match(&artifact.name) {
                continue;
            }
        }
        match unpack::ArtifactName::parse(&artifact.name) {
            Ok(name) => runs_by_commit
                .entry(name.commit)
                .or_default()
                .push(name.run_id),
            Err(e) => debug!(name = %artifact.name, "ignoring artifact: {}", e),
        }
    }

    let mut prs: Vec<(u64, Vec<String>)> = Vec::new();
    for pull in client.list_open_pulls().await? {
        match client.list_pull_commits(pull.number).await {
            Ok(commits) => prs.push((pull.number, commits)),
            Err(e) => {
                warn!(pull = pull.number, "skipping pull request, commits unavailable: {}", e)
            }
        }
    }

    let idx = ledger.entry_index(&tracked.owner, &tracked.repo, &tracked.test_name_matcher);
    let (items, observed) = select_work(&prs, &runs_by_commit, &ledger.commented[idx]);
    info!(
        owner = %tracked.owner,
        repo = %tracked.repo,
        pulls = prs.len(),
        to_comment = items.len(),
        "selected work"
    );

    for item in &items {
        match comment_on_pull(&client, tracked, config, item).await {
            Ok(()) => info!(pull = item.number, "posted flake comment"),
            Err(AppError::NoArtifacts) => {
                warn!(pull = item.number, "no artifacts downloadable for pull request")
            }
            Err(AppError::NothingToReport) => {
                info!(pull = item.number, "nothing to report for pull request")
            }
            Err(e) => return Err(e),
        }
    }

    // Snapshot semantics: the entry is replaced, not unioned, so runs
    // whose artifacts have expired age out of the ledger.
    ledger.commented[idx].run_ids = observed;
    Ok(())
}

/// One report pass scoped to the PR's commits, rendered and posted.
async fn comment_on_pull(
    client: &RepositoryClient,
    tracked: &TrackedRepo,
    config: &CommenterConfig,
    item: &WorkItem,
) -> AppResult<()> {
    let report_config = ReportConfig {
        owner: tracked.owner.clone(),
        repo: tracked.repo.clone(),
        token: tracked.token.clone(),
        test_suite_filter: tracked.test_name_matcher.clone(),
        commit_filter: item.commits.join("|"),
        download_dir: config.download_dir.clone(),
        ..ReportConfig::default()
    };

    let mut flake_report = report::load_report(&report_config).await?;
    report::generate(&mut flake_report)?;
    let body = report::render_comment(&flake_report)?;
    client.create_comment(item.number, &body).await
}

fn persist_ledger(ledger: &ProgressLedger, path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let yaml = serde_yaml::to_string(ledger)?;
    std::fs::write(path, yaml)?;
    info!(path = %path.display(), "wrote progress ledger");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(run_ids: &[&str]) -> LedgerEntry {
        LedgerEntry {
            owner: "o".to_string(),
            repo: "r".to_string(),
            test_name_matcher: "e2e".to_string(),
            run_ids: run_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn index(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(c, runs)| {
                (
                    c.to_string(),
                    runs.iter().map(|r| r.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_uncovered_runs_produce_work() {
        let prs = vec![(7, vec!["c1".to_string(), "c2".to_string()])];
        let idx = index(&[("c1", &["100"]), ("c2", &["101"])]);
        let (items, observed) = select_work(&prs, &idx, &entry(&["100"]));

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].number, 7);
        assert_eq!(items[0].run_ids, vec!["100", "101"]);
        assert_eq!(observed.len(), 2);
    }

    #[test]
    fn test_covered_pull_is_skipped_but_still_observed() {
        let prs = vec![(7, vec!["c1".to_string()])];
        let idx = index(&[("c1", &["100"])]);
        let (items, observed) = select_work(&prs, &idx, &entry(&["100", "999"]));

        assert!(items.is_empty());
        assert!(observed.contains("100"));
    }

    #[test]
    fn test_pull_without_artifacts_is_skipped() {
        let prs = vec![(7, vec!["c9".to_string()])];
        let idx = index(&[("c1", &["100"])]);
        let (items, observed) = select_work(&prs, &idx, &entry(&[]));

        assert!(items.is_empty());
        assert!(observed.is_empty());
    }

    #[test]
    fn test_duplicate_runs_collapse_per_pull() {
        let prs = vec![(7, vec!["c1".to_string(), "c2".to_string()])];
        let idx = index(&[("c1", &["100"]), ("c2", &["100"])]);
        let (items, _) = select_work(&prs, &idx, &entry(&[]));

        assert_eq!(items[0].run_ids, vec!["100"]);
    }
}
