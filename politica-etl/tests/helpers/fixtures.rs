//! Row builders

#![allow(dead_code)]

use politica_common::config::StatusPolicy;
use politica_etl::models::{CandidacyRow, VoteTallyRow};
use politica_etl::LoadOptions;

pub const ORDINARY: &str = "ELEIÇÃO ORDINÁRIA";

/// A 2022 first-turn candidacy for party `party`
pub fn candidacy(name: &str, party: i64, number: i64, external_id: &str) -> CandidacyRow {
    CandidacyRow {
        full_name: name.to_string(),
        ballot_nickname: name.split_whitespace().next().unwrap_or(name).to_string(),
        party_number: party,
        year: 2022,
        turn: 1,
        type_label: ORDINARY.to_string(),
        office: "DEPUTADO FEDERAL".to_string(),
        electoral_number: number,
        external_sequence_id: external_id.to_string(),
        party_initials: None,
        party_name: None,
    }
}

pub fn tally(external_id: &str, votes: i64, status: &str) -> VoteTallyRow {
    VoteTallyRow {
        external_sequence_id: external_id.to_string(),
        vote_count: votes,
        status_label: status.to_string(),
    }
}

pub fn options(batch_size: usize, max_workers: usize) -> LoadOptions {
    LoadOptions {
        batch_size,
        max_workers,
        status_policy: StatusPolicy::LastWins,
    }
}
