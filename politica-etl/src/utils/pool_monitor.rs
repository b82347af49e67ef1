//! Transaction monitoring
//!
//! Wraps a transaction on a worker's own connection and logs how long the
//! connection's write lock was held, so slow upsert groups show up in logs.

use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs begin, hold time and release
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run statements on inside the transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        let tx = self.tx.as_mut().expect("Transaction already consumed");
        &mut **tx
    }

    /// Commit the transaction and log hold time
    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        let tx = self.tx.take().expect("Transaction already consumed");

        tx.commit().await?;

        // Long write transactions block every other worker on SQLite
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "LONG TRANSACTION - write lock held for extended period"
            );
        } else if held_ms > 1000 {
            tracing::info!(
                caller = self.caller,
                held_ms = held_ms,
                "Transaction held longer than expected (>1s)"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms = held_ms, "Transaction committed");
        }

        Ok(())
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        // Still holding the transaction here means the caller bailed out with
        // an error; sqlx rolls back on drop.
        if self.tx.is_some() {
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Transaction rolled back (drop)"
            );
        }
    }
}

/// Begin a monitored transaction on an already-owned connection
///
/// # Example
/// ```ignore
/// let mut tx = begin_monitored(conn, "parties").await?;
/// sqlx::query("...").execute(tx.conn()).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    conn: &'c mut SqliteConnection,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>, sqlx::Error> {
    let start = Instant::now();
    let tx = conn.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 500 {
        tracing::info!(caller = caller, wait_ms = wait_ms, "Slow transaction begin");
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Transaction started");
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        caller,
        acquired_at: Instant::now(),
    })
}
