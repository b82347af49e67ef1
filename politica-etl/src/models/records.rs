//! Typed input rows
//!
//! Field names follow the row source's camelCase schema.

use crate::models::keys::{ElectionKey, PartyNumber, PoliticianKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One party registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyRow {
    pub number: PartyNumber,
    pub initials: String,
    pub name: String,
}

impl PartyRow {
    pub fn new(number: PartyNumber, initials: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            number,
            initials: initials.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoliticianRow {
    pub full_name: String,
    pub ballot_nickname: String,
}

impl PoliticianRow {
    pub fn key(&self) -> PoliticianKey {
        PoliticianKey::new(self.full_name.clone(), self.ballot_nickname.clone())
    }
}

/// One candidacy as delivered by the source
///
/// `party_initials`/`party_name` are optional extras some sources carry;
/// when present they let [`derive_parties`] build party rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidacyRow {
    pub full_name: String,
    pub ballot_nickname: String,
    pub party_number: PartyNumber,
    pub year: i32,
    pub turn: i32,
    pub type_label: String,
    pub office: String,
    pub electoral_number: i64,
    pub external_sequence_id: String,
    #[serde(default)]
    pub party_initials: Option<String>,
    #[serde(default)]
    pub party_name: Option<String>,
}

impl CandidacyRow {
    pub fn politician_key(&self) -> PoliticianKey {
        PoliticianKey::new(self.full_name.clone(), self.ballot_nickname.clone())
    }

    pub fn election_key(&self) -> ElectionKey {
        ElectionKey::new(self.year, self.turn, self.type_label.clone())
    }

    /// External sequence id, treating blank values as absent
    pub fn external_id(&self) -> Option<&str> {
        let id = self.external_sequence_id.trim();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }
}

/// One vote-tally row (never persisted directly)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTallyRow {
    pub external_sequence_id: String,
    pub vote_count: i64,
    pub status_label: String,
}

/// Tally rows from one source sub-file (e.g. one state)
#[derive(Debug, Clone, Default)]
pub struct TallyPartition {
    pub name: String,
    pub rows: Vec<VoteTallyRow>,
}

impl TallyPartition {
    pub fn new(name: impl Into<String>, rows: Vec<VoteTallyRow>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

/// Distinct party rows carried by candidacy rows (first occurrence per number)
///
/// Rows without both initials and name contribute nothing.
pub fn derive_parties(rows: &[CandidacyRow]) -> Vec<PartyRow> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| match (&row.party_initials, &row.party_name) {
            (Some(initials), Some(name)) if seen.insert(row.party_number) => {
                Some(PartyRow::new(row.party_number, initials.clone(), name.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Distinct politicians named by candidacy rows, in first-seen order
pub fn derive_politicians(rows: &[CandidacyRow]) -> Vec<PoliticianRow> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| seen.insert(row.politician_key()))
        .map(|row| PoliticianRow {
            full_name: row.full_name.clone(),
            ballot_nickname: row.ballot_nickname.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidacy(name: &str, party: i64, initials: Option<&str>) -> CandidacyRow {
        CandidacyRow {
            full_name: name.to_string(),
            ballot_nickname: name.to_lowercase(),
            party_number: party,
            year: 2022,
            turn: 1,
            type_label: "ELEIÇÃO ORDINÁRIA".to_string(),
            office: "DEPUTADO FEDERAL".to_string(),
            electoral_number: party * 100,
            external_sequence_id: format!("{}{}", party, name),
            party_initials: initials.map(str::to_string),
            party_name: initials.map(|i| format!("PARTIDO {}", i)),
        }
    }

    #[test]
    fn test_candidacy_row_deserializes_source_schema() {
        let json = r#"{
            "fullName": "MARIA DA SILVA", "ballotNickname": "MARIA",
            "partyNumber": 13, "year": 2022, "turn": 1,
            "typeLabel": "ELEIÇÃO ORDINÁRIA", "office": "SENADOR",
            "electoralNumber": 131, "externalSequenceId": "250001"
        }"#;
        let row: CandidacyRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.party_number, 13);
        assert_eq!(row.external_id(), Some("250001"));
        assert_eq!(row.party_initials, None);
    }

    #[test]
    fn test_blank_external_id_is_absent() {
        let mut row = candidacy("ANA", 13, None);
        row.external_sequence_id = "   ".to_string();
        assert_eq!(row.external_id(), None);
    }

    #[test]
    fn test_derive_parties_first_occurrence_wins() {
        let mut second = candidacy("BETO", 13, Some("PT"));
        second.party_name = Some("RENAMED".to_string());
        let rows = vec![
            candidacy("ANA", 13, Some("PT")),
            second,
            candidacy("CAIO", 45, None),
            candidacy("DORA", 22, Some("PL")),
        ];

        let parties = derive_parties(&rows);
        assert_eq!(
            parties,
            vec![
                PartyRow::new(13, "PT", "PARTIDO PT"),
                PartyRow::new(22, "PL", "PARTIDO PL"),
            ]
        );
    }

    #[test]
    fn test_derive_politicians_dedupes_composite_key() {
        let rows = vec![
            candidacy("ANA", 13, None),
            candidacy("ANA", 45, None),
            candidacy("BETO", 13, None),
        ];
        let politicians = derive_politicians(&rows);
        assert_eq!(politicians.len(), 2);
        assert_eq!(politicians[0].full_name, "ANA");
        assert_eq!(politicians[1].full_name, "BETO");
    }
}
