//! Database initialization
//!
//! Opens (or creates) the SQLite store and creates the four loader tables.
//! Every statement here is idempotent, so calling [`init_database`] on an
//! existing database is safe.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// How long a connection waits on a locked database before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize database connection pool and create tables if needed
///
/// `max_connections` should be at least the worker count plus one: every load
/// worker owns a connection for its whole run.
pub async fn init_database(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Foreign keys and busy_timeout are per-connection settings
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(2))
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all loader tables (dimension tables first, then candidacies)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_parties_table(pool).await?;
    create_politicians_table(pool).await?;
    create_elections_table(pool).await?;
    create_candidacies_table(pool).await?;
    Ok(())
}

/// Parties keyed by their registration number; initials are unique too
pub async fn create_parties_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parties (
            number INTEGER PRIMARY KEY,
            initials TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_politicians_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS politicians (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            nickname TEXT NOT NULL,
            UNIQUE(full_name, nickname)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Elections; `election_date` is derived from year and turn, so the natural
/// key is the stored year, not the date
pub async fn create_elections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS elections (
            id TEXT PRIMARY KEY,
            election_date TEXT NOT NULL,
            election_year INTEGER NOT NULL,
            turn INTEGER NOT NULL,
            election_type TEXT NOT NULL,
            UNIQUE(election_year, turn, election_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_candidacies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS candidacies (
            id TEXT PRIMARY KEY,
            politician_id TEXT NOT NULL REFERENCES politicians(id),
            party_number INTEGER NOT NULL REFERENCES parties(number),
            election_id TEXT NOT NULL REFERENCES elections(id),
            office TEXT NOT NULL,
            electoral_number INTEGER NOT NULL,
            external_sequence_id TEXT UNIQUE,
            total_votes INTEGER,
            status TEXT,
            UNIQUE(politician_id, party_number, election_id, office, electoral_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
