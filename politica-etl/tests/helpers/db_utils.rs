//! Database Test Utilities
//!
//! Temporary stores and table dumps used to compare store states.

#![allow(dead_code)]

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create temporary test database with the loader schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db(max_connections: u32) -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_politica.db");
    let pool = politica_common::db::init_database(&db_path, max_connections).await?;
    Ok((temp_dir, pool))
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    sqlx::query_scalar(&query).fetch_one(pool).await.unwrap()
}

/// Every row of every table, surrogate ids included
#[derive(Debug, PartialEq, Eq)]
pub struct StoreDump {
    pub parties: Vec<(i64, String, String)>,
    pub politicians: Vec<(String, String, String)>,
    pub elections: Vec<(String, String, i64, i64, String)>,
    pub candidacies: Vec<(String, String, i64, String, String, i64, Option<String>, Option<i64>, Option<String>)>,
}

pub async fn dump_store(pool: &SqlitePool) -> StoreDump {
    StoreDump {
        parties: sqlx::query_as("SELECT number, initials, name FROM parties ORDER BY number")
            .fetch_all(pool)
            .await
            .unwrap(),
        politicians: sqlx::query_as("SELECT id, full_name, nickname FROM politicians ORDER BY id")
            .fetch_all(pool)
            .await
            .unwrap(),
        elections: sqlx::query_as(
            "SELECT id, election_date, election_year, turn, election_type FROM elections ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .unwrap(),
        candidacies: sqlx::query_as(
            r#"
            SELECT id, politician_id, party_number, election_id, office, electoral_number,
                   external_sequence_id, total_votes, status
            FROM candidacies ORDER BY id
            "#,
        )
        .fetch_all(pool)
        .await
        .unwrap(),
    }
}

/// Candidacy described by natural keys only (comparable across stores)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, sqlx::FromRow)]
pub struct CandidacyView {
    pub full_name: String,
    pub nickname: String,
    pub party_number: i64,
    pub election_year: i64,
    pub turn: i64,
    pub election_type: String,
    pub office: String,
    pub electoral_number: i64,
    pub external_sequence_id: Option<String>,
    pub total_votes: Option<i64>,
    pub status: Option<String>,
}

pub async fn candidacy_projection(pool: &SqlitePool) -> Vec<CandidacyView> {
    let mut rows: Vec<CandidacyView> = sqlx::query_as(
        r#"
        SELECT p.full_name, p.nickname, c.party_number,
               e.election_year, e.turn, e.election_type,
               c.office, c.electoral_number, c.external_sequence_id,
               c.total_votes, c.status
        FROM candidacies c
        JOIN politicians p ON p.id = c.politician_id
        JOIN elections e ON e.id = c.election_id
        "#,
    )
    .fetch_all(pool)
    .await
    .unwrap();
    rows.sort();
    rows
}
