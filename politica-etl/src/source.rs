//! Row source adapter
//!
//! Reads the typed rows the load operations consume from JSON-lines files:
//! one JSON object per line, blank lines ignored. A directory of such files
//! is a set of vote partitions, one per file, ordered by file name.

use crate::error::{EtlError, EtlResult};
use crate::models::{TallyPartition, VoteTallyRow};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Read every row of a JSON-lines file
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> EtlResult<Vec<T>> {
    let file = File::open(path).map_err(|e| source_error(path, e))?;
    let mut rows = Vec::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| source_error(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line)
            .map_err(|e| source_error(path, format!("line {}: {}", index + 1, e)))?;
        rows.push(row);
    }

    tracing::debug!(path = %path.display(), rows = rows.len(), "Source file read");
    Ok(rows)
}

/// Read every `*.jsonl` file in `dir` as one tally partition
///
/// The partition name is the file stem.
pub fn read_partitions(dir: &Path) -> EtlResult<Vec<TallyPartition>> {
    let entries = std::fs::read_dir(dir).map_err(|e| source_error(dir, e))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| source_error(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl") {
            files.push(path);
        }
    }
    files.sort();

    let mut partitions = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rows: Vec<VoteTallyRow> = read_json_lines(&path)?;
        partitions.push(TallyPartition::new(name, rows));
    }

    tracing::info!(dir = %dir.display(), partitions = partitions.len(), "Vote partitions read");
    Ok(partitions)
}

fn source_error(path: &Path, message: impl ToString) -> EtlError {
    EtlError::Source {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartyRow;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_reads_rows_and_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("parties.jsonl");
        fs::write(
            &path,
            "{\"number\":13,\"initials\":\"PT\",\"name\":\"A\"}\n\n{\"number\":45,\"initials\":\"PSDB\",\"name\":\"B\"}\n",
        )
        .unwrap();

        let rows: Vec<PartyRow> = read_json_lines(&path).unwrap();
        assert_eq!(rows, vec![PartyRow::new(13, "PT", "A"), PartyRow::new(45, "PSDB", "B")]);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("parties.jsonl");
        fs::write(&path, "{\"number\":13,\"initials\":\"PT\",\"name\":\"A\"}\n{\"number\":\"x\"}\n").unwrap();

        let err = read_json_lines::<PartyRow>(&path).unwrap_err();
        match err {
            EtlError::Source { message, .. } => assert!(message.starts_with("line 2:")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partitions_ordered_by_file_name() {
        let dir = TempDir::new().unwrap();
        let row = "{\"externalSequenceId\":\"001\",\"voteCount\":5,\"statusLabel\":\"ELEITO\"}\n";
        fs::write(dir.path().join("SP.jsonl"), row).unwrap();
        fs::write(dir.path().join("AC.jsonl"), row).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let partitions = read_partitions(dir.path()).unwrap();
        let names: Vec<&str> = partitions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["AC", "SP"]);
        assert_eq!(partitions[1].rows[0].vote_count, 5);
    }
}
