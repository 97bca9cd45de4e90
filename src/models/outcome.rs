//! Parsed view of JUnit test outcomes.

use serde::{Deserialize, Serialize};

/// Test execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl TestStatus {
    /// String representation used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One test case outcome from a JUnit document. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Test name
    pub name: String,
    /// Class (or package) the test belongs to
    pub classname: String,
    /// Execution status
    pub status: TestStatus,
    /// Execution duration in seconds
    pub duration_secs: f64,
    /// Combined failure/error message and body text, if any
    pub error: Option<String>,
    /// Captured standard output
    pub system_out: String,
    /// Captured standard error
    pub system_err: String,
}

/// One parsed test suite.
#[derive(Debug, Clone)]
pub struct TestSuite {
    /// Suite name
    pub name: String,
    /// Outcomes in document order
    pub tests: Vec<TestOutcome>,
}
