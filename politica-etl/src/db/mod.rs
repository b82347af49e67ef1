//! Store access for politica-etl
//!
//! One module per table. Functions take `&mut SqliteConnection` so callers
//! decide whether a statement runs inside a worker's transaction or on its
//! own; bulk cache-seeding reads take the pool.

pub mod candidacies;
pub mod elections;
pub mod parties;
pub mod politicians;

use uuid::Uuid;

/// True when the store rejected a write because of a UNIQUE constraint
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

/// Parse a TEXT surrogate id column
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
