//! Election database operations

use crate::db::parse_id;
use crate::models::ElectionKey;
use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Insert an election unless `(year, turn, type)` is already stored
pub async fn insert_election_if_absent(
    conn: &mut SqliteConnection,
    key: &ElectionKey,
    election_date: NaiveDate,
    id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO elections (id, election_date, election_year, turn, election_type)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(election_year, turn, election_type) DO NOTHING
        "#,
    )
    .bind(id.to_string())
    .bind(election_date.to_string())
    .bind(key.year)
    .bind(key.turn)
    .bind(&key.type_label)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_election_id(
    conn: &mut SqliteConnection,
    key: &ElectionKey,
) -> Result<Option<Uuid>, sqlx::Error> {
    let id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM elections WHERE election_year = ? AND turn = ? AND election_type = ?",
    )
    .bind(key.year)
    .bind(key.turn)
    .bind(&key.type_label)
    .fetch_optional(&mut *conn)
    .await?;

    id.as_deref().map(parse_id).transpose()
}

/// Every stored election with its id (cache seeding)
pub async fn load_election_ids(pool: &SqlitePool) -> Result<Vec<(ElectionKey, Uuid)>, sqlx::Error> {
    let rows: Vec<(String, i32, i32, String)> =
        sqlx::query_as("SELECT id, election_year, turn, election_type FROM elections")
            .fetch_all(pool)
            .await?;

    rows.into_iter()
        .map(|(id, year, turn, label)| Ok((ElectionKey::new(year, turn, label), parse_id(&id)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_election_stored_with_derived_date() {
        let dir = TempDir::new().unwrap();
        let pool = politica_common::db::init_database(&dir.path().join("t.db"), 2)
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let key = ElectionKey::new(2022, 2, "ELEIÇÃO ORDINÁRIA");
        let date = key.election_date().unwrap();
        let id = Uuid::new_v4();
        assert!(insert_election_if_absent(&mut conn, &key, date, id).await.unwrap());
        assert!(!insert_election_if_absent(&mut conn, &key, date, Uuid::new_v4()).await.unwrap());

        let stored: String = sqlx::query_scalar("SELECT election_date FROM elections")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, "2022-10-30");
        assert_eq!(find_election_id(&mut conn, &key).await.unwrap(), Some(id));
        assert_eq!(load_election_ids(&pool).await.unwrap().len(), 1);
    }
}
