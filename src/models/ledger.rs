//! Progress ledger: which CI run IDs have already been reported on.
//!
//! The ledger is a snapshot of the run IDs visible in the artifact index at
//! the end of the last pass, not a monotonic union. An entry is replaced
//! wholesale after each pass, so a run whose artifact later expires drops out
//! of the next snapshot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Ledger record for one (owner, repo, test filter) combination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub owner: String,
    pub repo: String,
    pub test_name_matcher: String,
    /// Run IDs incorporated into a prior report/comment
    #[serde(default)]
    pub run_ids: BTreeSet<String>,
}

impl LedgerEntry {
    /// True when every given run ID is already recorded. Vacuously true for
    /// an empty slice, so a PR without any implicated run produces no work.
    pub fn covers(&self, run_ids: &[String]) -> bool {
        run_ids.iter().all(|id| self.run_ids.contains(id))
    }
}

/// Persisted ledger: one entry per tracked repository and filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressLedger {
    #[serde(default)]
    pub commented: Vec<LedgerEntry>,
}

impl ProgressLedger {
    /// Index of the entry for the given repository and filter, creating an
    /// empty one when absent.
    pub fn entry_index(&mut self, owner: &str, repo: &str, test_name_matcher: &str) -> usize {
        if let Some(idx) = self.commented.iter().position(|e| {
            e.owner == owner && e.repo == repo && e.test_name_matcher == test_name_matcher
        }) {
            return idx;
        }
        self.commented.push(LedgerEntry {
            owner: owner.to_string(),
            repo: repo.to_string(),
            test_name_matcher: test_name_matcher.to_string(),
            run_ids: BTreeSet::new(),
        });
        self.commented.len() - 1
    }
}

/// One pull request with new, not-yet-reported CI run activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Pull request number
    pub number: u64,
    /// The PR's commit SHAs
    pub commits: Vec<String>,
    /// Run IDs implicated by those commits
    pub run_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with(runs: &[&str]) -> LedgerEntry {
        LedgerEntry {
            owner: "operator-framework".to_string(),
            repo: "olm".to_string(),
            test_name_matcher: "e2e".to_string(),
            run_ids: runs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_covers_subset_and_superset() {
        let entry = entry_with(&["1", "2", "3"]);
        assert!(entry.covers(&["1".to_string(), "3".to_string()]));
        assert!(!entry.covers(&["1".to_string(), "4".to_string()]));
    }

    #[test]
    fn test_covers_empty_is_vacuously_true() {
        let entry = entry_with(&[]);
        assert!(entry.covers(&[]));
    }

    #[test]
    fn test_entry_index_creates_once() {
        let mut ledger = ProgressLedger::default();
        let a = ledger.entry_index("o", "r", "e2e");
        let b = ledger.entry_index("o", "r", "e2e");
        assert_eq!(a, b);
        assert_eq!(ledger.commented.len(), 1);

        let c = ledger.entry_index("o", "r", "unit");
        assert_ne!(a, c);
        assert_eq!(ledger.commented.len(), 2);
    }

    #[test]
    fn test_yaml_round_trip_preserves_entries() {
        let ledger = ProgressLedger {
            commented: vec![entry_with(&["55", "56"]), {
                let mut other = entry_with(&["9"]);
                other.repo = "other".to_string();
                other
            }],
        };

        let yaml = serde_yaml::to_string(&ledger).unwrap();
        let restored: ProgressLedger = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored, ledger);
    }
}
