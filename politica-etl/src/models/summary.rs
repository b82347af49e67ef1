//! Run summaries
//!
//! Every load operation ends with a [`LoadSummary`], even when some chunks
//! failed or rows were skipped. Counts come from [`LoadTally`] values that
//! workers produce per chunk and the coordinator merges.

use crate::models::run_state::RunState;
use serde::Serialize;

/// Why a single row was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowIssueKind {
    /// Candidacy names a party number with no stored party
    MissingParty { party_number: i64 },
    /// Party initials already belong to a party with another number
    InitialsTaken { initials: String },
    /// Tally names an external id no candidacy carries
    DanglingCandidate { external_id: String },
    /// Candidacy row belongs to another election year than the one requested
    YearMismatch { expected: i32, found: i32 },
    /// Election turn/year cannot produce an election date
    InvalidElection { year: i32, turn: i32 },
    /// External id already attached to a different candidacy
    ExternalIdConflict { external_id: String },
    /// Tally vote count is negative or would overflow the candidate's total
    InvalidVoteCount { external_id: String, vote_count: i64 },
}

/// A skipped row and where it sat in the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    /// Zero-based position in the operation's input
    pub row: usize,
    /// Natural key of the row, for humans
    pub key: String,
    #[serde(flatten)]
    pub kind: RowIssueKind,
}

/// A chunk (or upsert group) that failed as a whole and was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkError {
    pub chunk: usize,
    /// First input row of the chunk
    pub first_row: usize,
    /// One past the last input row of the chunk
    pub end_row: usize,
    pub message: String,
}

/// Counters produced by one chunk or group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadTally {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Creates that found the natural key already stored by another worker
    pub lost_races: usize,
    pub issues: Vec<RowIssue>,
}

impl LoadTally {
    /// Count a skipped row, recording the issue when there is one
    pub fn skip(&mut self, row: usize, key: impl Into<String>, issue: Option<RowIssueKind>) {
        self.skipped += 1;
        if let Some(kind) = issue {
            self.issues.push(RowIssue {
                row,
                key: key.into(),
                kind,
            });
        }
    }

    pub fn merge(&mut self, other: LoadTally) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.lost_races += other.lost_races;
        self.issues.extend(other.issues);
    }

    /// Rows accounted for by this tally
    pub fn rows(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }
}

/// Report returned by each load operation
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub operation: String,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Input rows in chunks that committed
    pub processed: usize,
    /// Tally rows whose status disagreed with an earlier row for the candidate
    pub status_conflicts: usize,
    /// Politician or election creates resolved to a row another worker stored
    pub lost_races: usize,
    pub chunk_errors: Vec<ChunkError>,
    pub row_issues: Vec<RowIssue>,
    pub final_state: RunState,
    pub elapsed_ms: u64,
}

impl LoadSummary {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            inserted: 0,
            updated: 0,
            skipped: 0,
            processed: 0,
            status_conflicts: 0,
            lost_races: 0,
            chunk_errors: Vec::new(),
            row_issues: Vec::new(),
            final_state: RunState::Idle,
            elapsed_ms: 0,
        }
    }

    /// Fold a tally into the summary (row issues sorted by input position)
    pub fn absorb(&mut self, tally: LoadTally) {
        self.inserted += tally.inserted;
        self.updated += tally.updated;
        self.skipped += tally.skipped;
        self.lost_races += tally.lost_races;
        self.row_issues.extend(tally.issues);
        self.row_issues.sort_by_key(|issue| issue.row);
    }

    pub fn is_clean(&self) -> bool {
        self.chunk_errors.is_empty()
    }
}
