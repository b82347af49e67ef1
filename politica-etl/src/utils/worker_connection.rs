//! Per-worker store connection
//!
//! A load worker owns exactly one pooled connection for as long as it runs.
//! Cloning a `WorkerConnection` yields an empty slot on the same pool, never
//! a shared handle, so two workers cannot end up on one connection.

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

pub struct WorkerConnection {
    pool: SqlitePool,
    conn: Option<PoolConnection<Sqlite>>,
}

impl WorkerConnection {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, conn: None }
    }

    /// Connection owned by this worker, acquired on first use
    pub async fn get(&mut self) -> Result<&mut SqliteConnection, sqlx::Error> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = self.pool.acquire().await?;
                tracing::debug!("Worker acquired store connection");
                conn
            }
        };
        Ok(&mut **self.conn.insert(conn))
    }

    /// Return the connection to the pool; the next `get` acquires a fresh one
    ///
    /// Called after a failed chunk so a broken connection is not reused.
    pub fn discard(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!("Worker released store connection");
        }
    }
}

impl Clone for WorkerConnection {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
