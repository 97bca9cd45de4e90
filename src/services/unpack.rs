//! Artifact naming and zip unpacking.
//!
//! Uploaded artifacts follow the `<suite>-<commit>-<runID>` convention, so
//! the commit a payload belongs to is recovered from the file name alone.
//! A zip's member files are concatenated into one byte stream before
//! extraction; multiple JUnit documents per artifact are the normal case.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{AppError, AppResult};

/// Structured form of an artifact file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub suite: String,
    pub commit: String,
    pub run_id: String,
}

impl ArtifactName {
    /// Parse `<suite>-<commit>-<runID>`, with or without a `.zip` suffix.
    /// The suite itself may contain dashes; the last two segments are
    /// always the commit and the run ID.
    pub fn parse(file_name: &str) -> AppResult<Self> {
        let stem = file_name.strip_suffix(".zip").unwrap_or(file_name);
        let segments: Vec<&str> = stem.split('-').collect();
        if segments.len() < 2 {
            return Err(AppError::InvalidArtifactName(file_name.to_string()));
        }
        let run_id = segments[segments.len() - 1];
        let commit = segments[segments.len() - 2];
        if commit.is_empty() || run_id.is_empty() {
            return Err(AppError::InvalidArtifactName(file_name.to_string()));
        }
        Ok(Self {
            suite: segments[..segments.len() - 2].join("-"),
            commit: commit.to_string(),
            run_id: run_id.to_string(),
        })
    }
}

/// One downloaded artifact ready for extraction.
#[derive(Debug)]
pub struct LoadedArtifact {
    pub name: ArtifactName,
    pub payload: Vec<u8>,
}

/// Concatenate the contents of every member file in a zip archive.
pub fn unzip_concat(path: &Path) -> AppResult<Vec<u8>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let mut payload = Vec::new();
    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        if member.is_dir() {
            continue;
        }
        member.read_to_end(&mut payload)?;
    }
    Ok(payload)
}

/// Load every `.zip` in `dir` whose file name matches `pattern` (all of
/// them when no pattern is set). Files with malformed names or corrupt
/// archives are skipped with a warning so one bad artifact cannot sink
/// the whole pass.
pub fn load_zipped_artifacts(
    dir: &Path,
    pattern: Option<&Regex>,
) -> AppResult<Vec<LoadedArtifact>> {
    if !dir.is_dir() {
        return Err(AppError::ImportDir(
            dir.to_path_buf(),
            "not a directory".to_string(),
        ));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "zip"))
        .collect();
    paths.sort();

    let mut loaded = Vec::new();
    for path in paths {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(pattern) = pattern {
            if !pattern.is_match(file_name) {
                debug!(file = file_name, "artifact does not match name filter");
                continue;
            }
        }
        let name = match ArtifactName::parse(file_name) {
            Ok(name) => name,
            Err(e) => {
                warn!(file = file_name, "skipping artifact: {}", e);
                continue;
            }
        };
        let payload = match unzip_concat(&path) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(file = file_name, "skipping unreadable archive: {}", e);
                continue;
            }
        };
        loaded.push(LoadedArtifact { name, payload });
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, body) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_parse_artifact_name() {
        let name = ArtifactName::parse("e2e-install-abc123-9876.zip").unwrap();
        assert_eq!(name.suite, "e2e-install");
        assert_eq!(name.commit, "abc123");
        assert_eq!(name.run_id, "9876");
    }

    #[test]
    fn test_parse_without_suite_or_suffix() {
        let name = ArtifactName::parse("abc123-9876").unwrap();
        assert_eq!(name.suite, "");
        assert_eq!(name.commit, "abc123");
        assert_eq!(name.run_id, "9876");
    }

    #[test]
    fn test_parse_rejects_short_names() {
        assert!(ArtifactName::parse("justonesegment.zip").is_err());
        assert!(ArtifactName::parse("-9876").is_err());
    }

    #[test]
    fn test_unzip_concatenates_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite-abc-1.zip");
        write_zip(&path, &[("a.xml", "<one/>"), ("b.xml", "<two/>")]);

        let payload = unzip_concat(&path).unwrap();
        assert_eq!(payload, b"<one/><two/>");
    }

    #[test]
    fn test_load_applies_name_filter_and_skips_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("e2e-abc-1.zip"), &[("r.xml", "<a/>")]);
        write_zip(&dir.path().join("unit-def-2.zip"), &[("r.xml", "<b/>")]);
        write_zip(&dir.path().join("badname.zip"), &[("r.xml", "<c/>")]);

        let pattern = Regex::new("^e2e-").unwrap();
        let loaded = load_zipped_artifacts(dir.path(), Some(&pattern)).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name.commit, "abc");

        let all = load_zipped_artifacts(dir.path(), None).unwrap();
        assert_eq!(all.len(), 2);
    }
}
