//! Party database operations
//!
//! Parties are keyed by number. `initials` and `name` are the mutable fields.

use crate::db::is_unique_violation;
use crate::models::{PartyNumber, PartyRow, RowIssueKind};
use crate::services::upsert::{Upsert, UpsertOutcome};
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

/// Insert a party unless its number is already stored
///
/// Returns `true` when a row was inserted. A clash on `initials` with a
/// different number is not absorbed here: it surfaces as a unique violation.
pub async fn insert_party_if_absent(
    conn: &mut SqliteConnection,
    party: &PartyRow,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO parties (number, initials, name)
        VALUES (?, ?, ?)
        ON CONFLICT(number) DO NOTHING
        "#,
    )
    .bind(party.number)
    .bind(&party.initials)
    .bind(&party.name)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Overwrite the mutable fields of an existing party
pub async fn update_party(
    conn: &mut SqliteConnection,
    party: &PartyRow,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE parties SET initials = ?, name = ? WHERE number = ?")
        .bind(&party.initials)
        .bind(&party.name)
        .bind(party.number)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn party_exists(
    conn: &mut SqliteConnection,
    number: PartyNumber,
) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT number FROM parties WHERE number = ?")
        .bind(number)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// All stored party numbers (cache seeding)
pub async fn load_party_numbers(pool: &SqlitePool) -> Result<Vec<PartyNumber>, sqlx::Error> {
    sqlx::query_scalar("SELECT number FROM parties")
        .fetch_all(pool)
        .await
}

/// Load a party by number
pub async fn load_party(pool: &SqlitePool, number: PartyNumber) -> Result<Option<PartyRow>, sqlx::Error> {
    let row: Option<(i64, String, String)> =
        sqlx::query_as("SELECT number, initials, name FROM parties WHERE number = ?")
            .bind(number)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(number, initials, name)| PartyRow::new(number, initials, name)))
}

/// Parties: insert when the number is new, otherwise overwrite initials and
/// name. Initials owned by another number reject the row in both paths.
#[async_trait]
impl Upsert for PartyRow {
    const TABLE: &'static str = "parties";

    fn natural_key(&self) -> String {
        self.number.to_string()
    }

    async fn apply(&self, conn: &mut SqliteConnection) -> Result<UpsertOutcome, sqlx::Error> {
        let initials_taken = || {
            UpsertOutcome::Skipped(Some(RowIssueKind::InitialsTaken {
                initials: self.initials.clone(),
            }))
        };

        match insert_party_if_absent(conn, self).await {
            Ok(true) => return Ok(UpsertOutcome::Inserted),
            Ok(false) => {}
            Err(e) if is_unique_violation(&e) => return Ok(initials_taken()),
            Err(e) => return Err(e),
        }

        match update_party(conn, self).await {
            Ok(_) => Ok(UpsertOutcome::Updated),
            Err(e) if is_unique_violation(&e) => Ok(initials_taken()),
            Err(e) => Err(e),
        }
    }
}
