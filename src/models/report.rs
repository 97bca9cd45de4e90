//! Flakiness report aggregate: keyed maps of failing and skipped tests.
//!
//! The merge algorithm preserves the historical output format exactly: the
//! incremental mean-duration recurrence and the stderr-based detail
//! de-duplication must not be "corrected" without changing every previously
//! generated report.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::outcome::{TestOutcome, TestStatus, TestSuite};

/// De-duplicated failure detail. Two outcomes share one detail exactly when
/// their stderr text is byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDetail {
    /// Occurrences sharing this stderr text
    pub count: usize,
    /// Representative failure/error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Representative standard output
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub system_out: String,
    /// Representative standard error
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub system_err: String,
}

/// Aggregate entry for one test, keyed by `classname/name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntry {
    pub class_name: String,
    pub name: String,
    /// Number of non-passed occurrences merged in; always equals `commits.len()`
    pub counts: usize,
    /// De-duplicated failure details
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub details: Vec<TestDetail>,
    /// Commit SHA of every contributing occurrence, in merge order
    pub commits: Vec<String>,
    /// Rolling mean duration in seconds
    pub mean_duration_sec: f64,
}

/// Aggregated flakiness report over one retrieval pass.
#[derive(Debug, Default, Serialize)]
pub struct FlakeReport {
    /// Artifacts successfully ingested
    pub total_test_count: usize,
    /// Distinct failing tests; populated at render time
    pub flake_test_count: usize,
    /// Distinct skipped tests; populated at render time
    pub skipped_test_count: usize,
    /// Sorted by counts, then number of commits; populated at render time
    pub flake_tests: Vec<TestEntry>,
    pub skipped_tests: Vec<TestEntry>,
    #[serde(skip)]
    pub(crate) flake_map: HashMap<String, TestEntry>,
    #[serde(skip)]
    pub(crate) skipped_map: HashMap<String, TestEntry>,
}

impl FlakeReport {
    pub fn new() -> Self {
        FlakeReport::default()
    }

    /// Merge one artifact's parsed suites, attributing outcomes to `commit`.
    ///
    /// Passed outcomes are discarded; skipped outcomes land in the skipped
    /// map; failed and errored outcomes land in the flake map.
    pub fn add_artifact(&mut self, suites: &[TestSuite], commit: &str) {
        for suite in suites {
            for test in &suite.tests {
                match test.status {
                    TestStatus::Passed => continue,
                    TestStatus::Skipped => merge_outcome(&mut self.skipped_map, test, commit),
                    TestStatus::Failed | TestStatus::Errored => {
                        merge_outcome(&mut self.flake_map, test, commit)
                    }
                }
            }
        }
        self.total_test_count += 1;
    }

    /// True when no failing and no skipped test has been merged.
    pub fn is_empty(&self) -> bool {
        self.flake_map.is_empty() && self.skipped_map.is_empty()
    }
}

/// Merge one outcome into a keyed map.
fn merge_outcome(map: &mut HashMap<String, TestEntry>, test: &TestOutcome, commit: &str) {
    let key = format!("{}/{}", test.classname, test.name);

    match map.get_mut(&key) {
        None => {
            map.insert(
                key,
                TestEntry {
                    class_name: test.classname.clone(),
                    name: test.name.clone(),
                    counts: 1,
                    commits: vec![commit.to_string()],
                    mean_duration_sec: test.duration_secs,
                    details: initial_details(test),
                },
            );
        }
        Some(entry) => {
            // Historical recurrence, kept verbatim for output compatibility.
            entry.mean_duration_sec += (test.duration_secs - entry.mean_duration_sec)
                / (entry.counts + 1) as f64;
            entry.counts += 1;
            entry.commits.push(commit.to_string());
            merge_detail(entry, test);
        }
    }
}

fn initial_details(test: &TestOutcome) -> Vec<TestDetail> {
    if test.error.is_none() && test.system_out.is_empty() && test.system_err.is_empty() {
        return Vec::new();
    }
    vec![TestDetail {
        count: 1,
        error: test.error.clone(),
        system_out: test.system_out.clone(),
        system_err: test.system_err.clone(),
    }]
}

fn merge_detail(entry: &mut TestEntry, test: &TestOutcome) {
    if test.error.is_none() && test.system_out.is_empty() && test.system_err.is_empty() {
        return;
    }
    for detail in &mut entry.details {
        if detail.system_err == test.system_err {
            detail.count += 1;
            return;
        }
    }
    entry.details.push(TestDetail {
        count: 1,
        error: test.error.clone(),
        system_out: test.system_out.clone(),
        system_err: test.system_err.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, status: TestStatus, duration: f64, stderr: &str) -> TestOutcome {
        TestOutcome {
            name: name.to_string(),
            classname: "e2e".to_string(),
            status,
            duration_secs: duration,
            error: if stderr.is_empty() {
                None
            } else {
                Some(format!("{} failed", name))
            },
            system_out: String::new(),
            system_err: stderr.to_string(),
        }
    }

    fn suite(tests: Vec<TestOutcome>) -> TestSuite {
        TestSuite {
            name: "install".to_string(),
            tests,
        }
    }

    #[test]
    fn test_passed_outcomes_are_discarded() {
        let mut report = FlakeReport::new();
        report.add_artifact(
            &[suite(vec![
                outcome("a", TestStatus::Failed, 1.0, "boom"),
                outcome("b", TestStatus::Failed, 1.0, "boom"),
                outcome("c", TestStatus::Passed, 1.0, ""),
            ])],
            "c1",
        );

        assert_eq!(report.flake_map.len(), 2);
        assert_eq!(report.skipped_map.len(), 0);
        assert_eq!(report.total_test_count, 1);
        for entry in report.flake_map.values() {
            assert_eq!(entry.counts, 1);
        }
    }

    #[test]
    fn test_skipped_outcomes_go_to_skipped_map() {
        let mut report = FlakeReport::new();
        report.add_artifact(
            &[suite(vec![outcome("a", TestStatus::Skipped, 0.0, "")])],
            "c1",
        );

        assert!(report.flake_map.is_empty());
        assert_eq!(report.skipped_map.len(), 1);
    }

    #[test]
    fn test_counts_track_commits() {
        let mut report = FlakeReport::new();
        for commit in ["c1", "c2", "c3"] {
            report.add_artifact(
                &[suite(vec![outcome("a", TestStatus::Failed, 2.0, "boom")])],
                commit,
            );
        }

        let entry = &report.flake_map["e2e/a"];
        assert_eq!(entry.counts, 3);
        assert_eq!(entry.commits, vec!["c1", "c2", "c3"]);
        assert_eq!(entry.commits.len(), entry.counts);
    }

    #[test]
    fn test_identical_stderr_collapses_into_one_detail() {
        let mut report = FlakeReport::new();
        report.add_artifact(
            &[suite(vec![outcome("a", TestStatus::Failed, 1.0, "timeout")])],
            "c1",
        );
        report.add_artifact(
            &[suite(vec![outcome("a", TestStatus::Failed, 1.0, "timeout")])],
            "c2",
        );
        report.add_artifact(
            &[suite(vec![outcome("a", TestStatus::Errored, 1.0, "oom")])],
            "c3",
        );

        let entry = &report.flake_map["e2e/a"];
        assert_eq!(entry.details.len(), 2);
        assert_eq!(entry.details[0].count, 2);
        assert_eq!(entry.details[0].system_err, "timeout");
        assert_eq!(entry.details[1].count, 1);
        assert_eq!(entry.details[1].system_err, "oom");
    }

    #[test]
    fn test_no_detail_recorded_for_bare_outcomes() {
        let mut report = FlakeReport::new();
        report.add_artifact(
            &[suite(vec![outcome("a", TestStatus::Failed, 1.0, "")])],
            "c1",
        );
        // `outcome` leaves error unset when stderr is empty
        let entry = &report.flake_map["e2e/a"];
        assert!(entry.details.is_empty());
    }

    #[test]
    fn test_mean_duration_recurrence() {
        let mut report = FlakeReport::new();
        report.add_artifact(
            &[suite(vec![outcome("a", TestStatus::Failed, 4.0, "x")])],
            "c1",
        );
        report.add_artifact(
            &[suite(vec![outcome("a", TestStatus::Failed, 8.0, "x")])],
            "c2",
        );

        // mean' = (8 - 4) / (1 + 1) + 4
        let entry = &report.flake_map["e2e/a"];
        assert!((entry.mean_duration_sec - 6.0).abs() < f64::EPSILON);

        report.add_artifact(
            &[suite(vec![outcome("a", TestStatus::Failed, 12.0, "x")])],
            "c3",
        );
        // mean' = (12 - 6) / (2 + 1) + 6
        let entry = &report.flake_map["e2e/a"];
        assert!((entry.mean_duration_sec - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_commit_still_counts_twice() {
        let mut report = FlakeReport::new();
        for _ in 0..2 {
            report.add_artifact(
                &[suite(vec![outcome("a", TestStatus::Failed, 1.0, "x")])],
                "c1",
            );
        }

        let entry = &report.flake_map["e2e/a"];
        assert_eq!(entry.counts, 2);
        assert_eq!(entry.commits, vec!["c1", "c1"]);
    }
}
