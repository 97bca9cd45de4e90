//! JUnit XML extraction.
//!
//! Artifact payloads arrive as raw bytes: zero or more JUnit documents
//! concatenated together, exactly as the files sat in the zip. The event
//! reader scans for every `<testsuite>` element in the stream, so
//! concatenated documents parse without any splitting step.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::{TestOutcome, TestStatus, TestSuite};

/// Which element's character data is currently being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    Failure,
    Error,
    SystemOut,
    SystemErr,
}

/// Parse raw JUnit bytes into test suites.
pub fn parse_suites(raw: &[u8]) -> AppResult<Vec<TestSuite>> {
    let mut reader = Reader::from_reader(raw);
    let mut buf = Vec::new();

    let mut suites: Vec<TestSuite> = Vec::new();
    let mut open_suites: Vec<TestSuite> = Vec::new();
    let mut current: Option<TestOutcome> = None;
    let mut target = TextTarget::None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| AppError::Extraction(format!("invalid JUnit XML: {}", e)))?;

        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"testsuite" => open_suites.push(TestSuite {
                    name: attr(e, b"name")?.unwrap_or_default(),
                    tests: Vec::new(),
                }),
                b"testcase" => current = Some(new_outcome(e)?),
                b"failure" if current.is_some() => {
                    mark_failure(&mut current, TestStatus::Failed, attr(e, b"message")?);
                    target = TextTarget::Failure;
                }
                b"error" if current.is_some() => {
                    mark_failure(&mut current, TestStatus::Errored, attr(e, b"message")?);
                    target = TextTarget::Error;
                }
                b"skipped" if current.is_some() => {
                    if let Some(test) = current.as_mut() {
                        test.status = TestStatus::Skipped;
                    }
                }
                b"system-out" if current.is_some() => target = TextTarget::SystemOut,
                b"system-err" if current.is_some() => target = TextTarget::SystemErr,
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"testsuite" => suites.push(TestSuite {
                    name: attr(e, b"name")?.unwrap_or_default(),
                    tests: Vec::new(),
                }),
                b"testcase" => {
                    let outcome = new_outcome(e)?;
                    push_outcome(&mut open_suites, &mut suites, outcome);
                }
                b"failure" if current.is_some() => {
                    mark_failure(&mut current, TestStatus::Failed, attr(e, b"message")?)
                }
                b"error" if current.is_some() => {
                    mark_failure(&mut current, TestStatus::Errored, attr(e, b"message")?)
                }
                b"skipped" if current.is_some() => {
                    if let Some(test) = current.as_mut() {
                        test.status = TestStatus::Skipped;
                    }
                }
                _ => {}
            },
            Event::Text(ref t) => {
                if target != TextTarget::None {
                    let text = t
                        .unescape()
                        .map_err(|e| AppError::Extraction(format!("invalid JUnit XML: {}", e)))?;
                    append_text(&mut current, target, text.trim());
                }
            }
            Event::CData(ref t) => {
                if target != TextTarget::None {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    append_text(&mut current, target, text.trim());
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"testsuite" => {
                    if let Some(suite) = open_suites.pop() {
                        suites.push(suite);
                    }
                }
                b"testcase" => {
                    if let Some(outcome) = current.take() {
                        push_outcome(&mut open_suites, &mut suites, outcome);
                    }
                    target = TextTarget::None;
                }
                b"failure" | b"error" | b"system-out" | b"system-err" => {
                    target = TextTarget::None
                }
                _ => {}
            },
            Event::Eof => break,
            // Declarations, comments, processing instructions: irrelevant,
            // including the declarations of concatenated follow-up documents.
            _ => {}
        }
        buf.clear();
    }

    // A testcase left open means the payload was truncated mid-element.
    if current.is_some() || !open_suites.is_empty() {
        warn!("JUnit payload ended inside an open element; keeping parsed prefix");
        suites.extend(open_suites);
    }

    Ok(suites)
}

/// Build an outcome from a `<testcase>` start tag; status starts as passed
/// and is downgraded by child elements.
fn new_outcome(e: &BytesStart<'_>) -> AppResult<TestOutcome> {
    Ok(TestOutcome {
        name: attr(e, b"name")?.unwrap_or_default(),
        classname: attr(e, b"classname")?.unwrap_or_default(),
        status: TestStatus::Passed,
        duration_secs: attr(e, b"time")?
            .and_then(|t| t.parse().ok())
            .unwrap_or(0.0),
        error: None,
        system_out: String::new(),
        system_err: String::new(),
    })
}

fn mark_failure(current: &mut Option<TestOutcome>, status: TestStatus, message: Option<String>) {
    if let Some(test) = current.as_mut() {
        test.status = status;
        if let Some(message) = message {
            if !message.is_empty() {
                test.error = Some(message);
            }
        }
    }
}

/// Append captured character data to the field the open element selects.
/// Failure/error body text extends the message from the tag attributes.
fn append_text(current: &mut Option<TestOutcome>, target: TextTarget, text: &str) {
    if text.is_empty() {
        return;
    }
    let Some(test) = current.as_mut() else {
        return;
    };
    match target {
        TextTarget::Failure | TextTarget::Error => match test.error.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(text);
            }
            None => test.error = Some(text.to_string()),
        },
        TextTarget::SystemOut => test.system_out.push_str(text),
        TextTarget::SystemErr => test.system_err.push_str(text),
        TextTarget::None => {}
    }
}

fn push_outcome(open_suites: &mut [TestSuite], suites: &mut Vec<TestSuite>, outcome: TestOutcome) {
    match open_suites.last_mut() {
        Some(suite) => suite.tests.push(outcome),
        None => {
            // Stray testcase outside any suite; keep it under an unnamed one.
            warn!("testcase outside of a testsuite element");
            suites.push(TestSuite {
                name: String::new(),
                tests: vec![outcome],
            });
        }
    }
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> AppResult<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|e| AppError::Extraction(format!("invalid JUnit XML: {}", e)))?;
        if a.key.as_ref() == name {
            let value = a
                .unescape_value()
                .map_err(|e| AppError::Extraction(format!("invalid JUnit XML: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites>
  <testsuite name="install" tests="3" failures="1">
    <testcase classname="e2e" name="creates operator" time="4.2">
      <failure message="timed out">waited 300s for deployment</failure>
      <system-out>creating namespace</system-out>
      <system-err>context deadline exceeded</system-err>
    </testcase>
    <testcase classname="e2e" name="upgrades operator" time="1.5"/>
    <testcase classname="e2e" name="deletes operator" time="0.1">
      <skipped/>
    </testcase>
  </testsuite>
</testsuites>"#;

    #[test]
    fn test_parses_statuses_and_fields() {
        let suites = parse_suites(REPORT.as_bytes()).unwrap();
        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].name, "install");
        assert_eq!(suites[0].tests.len(), 3);

        let failed = &suites[0].tests[0];
        assert_eq!(failed.status, TestStatus::Failed);
        assert_eq!(failed.name, "creates operator");
        assert_eq!(failed.classname, "e2e");
        assert!((failed.duration_secs - 4.2).abs() < 1e-9);
        assert_eq!(
            failed.error.as_deref(),
            Some("timed out\nwaited 300s for deployment")
        );
        assert_eq!(failed.system_out, "creating namespace");
        assert_eq!(failed.system_err, "context deadline exceeded");

        assert_eq!(suites[0].tests[1].status, TestStatus::Passed);
        assert_eq!(suites[0].tests[2].status, TestStatus::Skipped);
    }

    #[test]
    fn test_errored_testcase() {
        let xml = r#"<testsuite name="s">
            <testcase classname="c" name="n" time="0.5">
              <error message="panic"/>
            </testcase>
        </testsuite>"#;
        let suites = parse_suites(xml.as_bytes()).unwrap();
        assert_eq!(suites[0].tests[0].status, TestStatus::Errored);
        assert_eq!(suites[0].tests[0].error.as_deref(), Some("panic"));
    }

    #[test]
    fn test_concatenated_documents_parse_as_one_stream() {
        let combined = format!("{}\n{}", REPORT, REPORT);
        let suites = parse_suites(combined.as_bytes()).unwrap();
        assert_eq!(suites.len(), 2);
        assert_eq!(suites[0].tests.len(), 3);
        assert_eq!(suites[1].tests.len(), 3);
    }

    #[test]
    fn test_empty_payload_yields_no_suites() {
        let suites = parse_suites(b"").unwrap();
        assert!(suites.is_empty());
    }

    #[test]
    fn test_cdata_failure_body() {
        let xml = r#"<testsuite name="s">
            <testcase classname="c" name="n">
              <failure><![CDATA[assertion <failed>]]></failure>
            </testcase>
        </testsuite>"#;
        let suites = parse_suites(xml.as_bytes()).unwrap();
        assert_eq!(
            suites[0].tests[0].error.as_deref(),
            Some("assertion <failed>")
        );
    }
}
