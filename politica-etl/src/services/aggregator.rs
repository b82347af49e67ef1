//! Vote aggregation
//!
//! Reduces tally rows from every partition into one total and one status per
//! candidate. Totals are summed across all partitions; the status is chosen
//! by [`StatusPolicy`]. Negative counts and counts that would overflow a
//! total are rejected as row issues. Nothing here touches the store: the loader only
//! merges once every partition has been folded in, so a candidate is
//! written exactly once per run.

use crate::db::candidacies::VoteResult;
use crate::models::{RowIssue, RowIssueKind, TallyPartition};
use politica_common::config::StatusPolicy;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTotal {
    pub total_votes: i64,
    pub status: String,
}

/// A tally row whose status disagreed with the one already held
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusConflict {
    pub external_id: String,
    pub partition: String,
    pub kept: String,
    pub discarded: String,
}

#[derive(Debug)]
pub struct VoteAggregator {
    policy: StatusPolicy,
    totals: HashMap<String, CandidateTotal>,
    conflicts: Vec<StatusConflict>,
    rejected: Vec<RowIssue>,
    rows: usize,
    unkeyed_rows: usize,
    partitions: usize,
}

/// Result of folding every partition
#[derive(Debug, Clone, Default)]
pub struct AggregatedVotes {
    pub totals: HashMap<String, CandidateTotal>,
    pub status_conflicts: Vec<StatusConflict>,
    /// Rows left out of every total; `row` counts tally rows across
    /// partitions in the order they were folded
    pub rejected: Vec<RowIssue>,
    pub rows: usize,
    /// Rows with a blank external id (ignored)
    pub unkeyed_rows: usize,
    pub partitions: usize,
}

impl AggregatedVotes {
    /// One result per candidate, ordered by external id
    pub fn into_results(self) -> Vec<VoteResult> {
        let mut results: Vec<VoteResult> = self
            .totals
            .into_iter()
            .map(|(external_id, total)| VoteResult {
                external_id,
                total_votes: total.total_votes,
                status: total.status,
            })
            .collect();
        results.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        results
    }
}

impl VoteAggregator {
    pub fn new(policy: StatusPolicy) -> Self {
        Self {
            policy,
            totals: HashMap::new(),
            conflicts: Vec::new(),
            rejected: Vec::new(),
            rows: 0,
            unkeyed_rows: 0,
            partitions: 0,
        }
    }

    /// Fold every partition and return the per-candidate results
    pub fn aggregate<I>(policy: StatusPolicy, partitions: I) -> AggregatedVotes
    where
        I: IntoIterator<Item = TallyPartition>,
    {
        let mut aggregator = Self::new(policy);
        for partition in partitions {
            aggregator.add_partition(&partition);
        }
        aggregator.finish()
    }

    pub fn add_partition(&mut self, partition: &TallyPartition) {
        self.partitions += 1;

        for row in &partition.rows {
            let position = self.rows;
            self.rows += 1;
            let external_id = row.external_sequence_id.trim();
            if external_id.is_empty() {
                self.unkeyed_rows += 1;
                continue;
            }

            if row.vote_count < 0 {
                self.rejected.push(invalid_count(position, external_id, row.vote_count));
                continue;
            }

            let Some(total) = self.totals.get_mut(external_id) else {
                self.totals.insert(
                    external_id.to_string(),
                    CandidateTotal {
                        total_votes: row.vote_count,
                        status: row.status_label.clone(),
                    },
                );
                continue;
            };

            let Some(sum) = total.total_votes.checked_add(row.vote_count) else {
                self.rejected.push(invalid_count(position, external_id, row.vote_count));
                continue;
            };
            total.total_votes = sum;
            if total.status == row.status_label {
                continue;
            }

            let (kept, discarded) = match self.policy {
                StatusPolicy::LastWins => {
                    let previous = std::mem::replace(&mut total.status, row.status_label.clone());
                    (row.status_label.clone(), previous)
                }
                StatusPolicy::FirstWins => (total.status.clone(), row.status_label.clone()),
            };
            tracing::debug!(
                external_id,
                partition = %partition.name,
                kept = %kept,
                discarded = %discarded,
                "Conflicting candidate status"
            );
            self.conflicts.push(StatusConflict {
                external_id: external_id.to_string(),
                partition: partition.name.clone(),
                kept,
                discarded,
            });
        }
    }

    pub fn finish(self) -> AggregatedVotes {
        if !self.rejected.is_empty() {
            tracing::warn!(
                rejected = self.rejected.len(),
                "Tally rows with negative or overflowing vote counts left out"
            );
        }
        if !self.conflicts.is_empty() {
            tracing::warn!(
                conflicts = self.conflicts.len(),
                policy = ?self.policy,
                "Candidates reported with conflicting statuses"
            );
        }

        AggregatedVotes {
            totals: self.totals,
            status_conflicts: self.conflicts,
            rejected: self.rejected,
            rows: self.rows,
            unkeyed_rows: self.unkeyed_rows,
            partitions: self.partitions,
        }
    }
}

fn invalid_count(position: usize, external_id: &str, vote_count: i64) -> RowIssue {
    RowIssue {
        row: position,
        key: external_id.to_string(),
        kind: RowIssueKind::InvalidVoteCount {
            external_id: external_id.to_string(),
            vote_count,
        },
    }
}
