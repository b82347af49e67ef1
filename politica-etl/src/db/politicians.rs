//! Politician database operations
//!
//! Politicians carry a surrogate UUID; `(full_name, nickname)` is the
//! natural key and is UNIQUE in the store, which is what settles races
//! between workers creating the same politician.

use crate::db::parse_id;
use crate::models::PoliticianKey;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Insert a politician unless the key is already stored
///
/// Returns `true` when `id` was written. On `false` the stored row keeps
/// its own id; read it back with [`find_politician_id`].
pub async fn insert_politician_if_absent(
    conn: &mut SqliteConnection,
    key: &PoliticianKey,
    id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO politicians (id, full_name, nickname)
        VALUES (?, ?, ?)
        ON CONFLICT(full_name, nickname) DO NOTHING
        "#,
    )
    .bind(id.to_string())
    .bind(&key.full_name)
    .bind(&key.nickname)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_politician_id(
    conn: &mut SqliteConnection,
    key: &PoliticianKey,
) -> Result<Option<Uuid>, sqlx::Error> {
    let id: Option<String> =
        sqlx::query_scalar("SELECT id FROM politicians WHERE full_name = ? AND nickname = ?")
            .bind(&key.full_name)
            .bind(&key.nickname)
            .fetch_optional(&mut *conn)
            .await?;

    id.as_deref().map(parse_id).transpose()
}

/// Every stored politician with its id (cache seeding)
pub async fn load_politician_ids(
    pool: &SqlitePool,
) -> Result<Vec<(PoliticianKey, Uuid)>, sqlx::Error> {
    let rows: Vec<(String, String, String)> =
        sqlx::query_as("SELECT id, full_name, nickname FROM politicians")
            .fetch_all(pool)
            .await?;

    rows.into_iter()
        .map(|(id, full_name, nickname)| Ok((PoliticianKey::new(full_name, nickname), parse_id(&id)?)))
        .collect()
}
