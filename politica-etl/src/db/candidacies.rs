//! Candidacy database operations
//!
//! A candidacy is identified by `(politician, party, election, office,
//! electoral number)`. The external sequence id is a second, optional
//! natural key: vote results are attached through it.

use crate::models::{PartyNumber, RowIssueKind};
use crate::services::upsert::{Upsert, UpsertOutcome};
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

/// A candidacy with its dimensions already resolved to store ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCandidacy {
    pub id: Uuid,
    pub politician_id: Uuid,
    pub party_number: PartyNumber,
    pub election_id: Uuid,
    pub office: String,
    pub electoral_number: i64,
    pub external_sequence_id: Option<String>,
}

/// Final result for one candidate, addressed by external id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteResult {
    pub external_id: String,
    pub total_votes: i64,
    pub status: String,
}

/// Insert a candidacy unless its identity tuple (or its external id) exists
pub async fn insert_candidacy_if_absent(
    conn: &mut SqliteConnection,
    candidacy: &NewCandidacy,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO candidacies (
            id, politician_id, party_number, election_id,
            office, electoral_number, external_sequence_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(candidacy.id.to_string())
    .bind(candidacy.politician_id.to_string())
    .bind(candidacy.party_number)
    .bind(candidacy.election_id.to_string())
    .bind(&candidacy.office)
    .bind(candidacy.electoral_number)
    .bind(&candidacy.external_sequence_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// True when `external_id` is held by a candidacy with a different identity
pub async fn external_id_held_elsewhere(
    conn: &mut SqliteConnection,
    candidacy: &NewCandidacy,
    external_id: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM candidacies
        WHERE external_sequence_id = ?
          AND NOT (politician_id = ? AND party_number = ? AND election_id = ?
                   AND office = ? AND electoral_number = ?)
        "#,
    )
    .bind(external_id)
    .bind(candidacy.politician_id.to_string())
    .bind(candidacy.party_number)
    .bind(candidacy.election_id.to_string())
    .bind(&candidacy.office)
    .bind(candidacy.electoral_number)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

/// Set (never add to) the vote total and status of one candidacy
pub async fn set_vote_result(
    conn: &mut SqliteConnection,
    result: &VoteResult,
) -> Result<bool, sqlx::Error> {
    let done = sqlx::query(
        "UPDATE candidacies SET total_votes = ?, status = ? WHERE external_sequence_id = ?",
    )
    .bind(result.total_votes)
    .bind(&result.status)
    .bind(&result.external_id)
    .execute(&mut *conn)
    .await?;

    Ok(done.rows_affected() > 0)
}

/// External ids of every stored candidacy
pub async fn load_external_ids(pool: &SqlitePool) -> Result<HashSet<String>, sqlx::Error> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT external_sequence_id FROM candidacies WHERE external_sequence_id IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().collect())
}

#[async_trait]
impl Upsert for NewCandidacy {
    const TABLE: &'static str = "candidacies";

    fn natural_key(&self) -> String {
        match &self.external_sequence_id {
            Some(id) => id.clone(),
            None => format!(
                "{}/{}/{}/{}/{}",
                self.politician_id, self.party_number, self.election_id, self.office, self.electoral_number
            ),
        }
    }

    /// Existing candidacies are left untouched: none of their identity fields
    /// may change and vote fields belong to the merge step.
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<UpsertOutcome, sqlx::Error> {
        if insert_candidacy_if_absent(conn, self).await? {
            return Ok(UpsertOutcome::Inserted);
        }

        if let Some(external_id) = self.external_sequence_id.as_deref() {
            if external_id_held_elsewhere(conn, self, external_id).await? {
                return Ok(UpsertOutcome::Skipped(Some(RowIssueKind::ExternalIdConflict {
                    external_id: external_id.to_string(),
                })));
            }
        }

        Ok(UpsertOutcome::Skipped(None))
    }
}

#[async_trait]
impl Upsert for VoteResult {
    const TABLE: &'static str = "candidacies";

    fn natural_key(&self) -> String {
        self.external_id.clone()
    }

    async fn apply(&self, conn: &mut SqliteConnection) -> Result<UpsertOutcome, sqlx::Error> {
        if set_vote_result(conn, self).await? {
            Ok(UpsertOutcome::Updated)
        } else {
            tracing::warn!(external_id = %self.external_id, "Vote result names no stored candidacy");
            Ok(UpsertOutcome::Skipped(Some(RowIssueKind::DanglingCandidate {
                external_id: self.external_id.clone(),
            })))
        }
    }
}
