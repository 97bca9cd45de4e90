//! Domain models for the flake reporter.

pub mod ledger;
pub mod outcome;
pub mod report;

// Re-export commonly used types
pub use ledger::{LedgerEntry, ProgressLedger, WorkItem};
pub use outcome::{TestOutcome, TestStatus, TestSuite};
pub use report::{FlakeReport, TestDetail, TestEntry};
