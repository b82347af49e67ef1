//! Idempotent upserts
//!
//! Each table's write policy lives in its [`Upsert`] impl (see `crate::db`):
//! parties overwrite their mutable fields, candidacies are insert-only, vote
//! results overwrite totals. [`UpsertEngine`] runs groups of rows, each
//! inside a single transaction, so a failed group never leaves half its rows
//! behind.

use crate::models::{ChunkError, LoadTally, RowIssueKind};
use crate::utils::{begin_monitored, WorkerConnection};
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

/// What one upsert did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Row left the store untouched; `Some` when that is worth reporting
    Skipped(Option<RowIssueKind>),
}

/// A row that knows how to write itself idempotently
#[async_trait]
pub trait Upsert: Send + Sync {
    /// Target table, for logs
    const TABLE: &'static str;

    fn natural_key(&self) -> String;

    /// Write the row. Applying the same row twice must leave the store as
    /// after the first application.
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<UpsertOutcome, sqlx::Error>;
}

/// Outcome of [`UpsertEngine::upsert_batch`]
#[derive(Debug, Default)]
pub struct UpsertReport {
    /// Rows in groups that committed
    pub processed: usize,
    pub tally: LoadTally,
    /// Groups rolled back, with their row ranges
    pub group_errors: Vec<ChunkError>,
}

/// Applies rows in fixed-size transactional groups
#[derive(Debug, Clone, Copy)]
pub struct UpsertEngine {
    group_size: usize,
}

impl UpsertEngine {
    pub fn new(group_size: usize) -> Self {
        Self {
            group_size: group_size.max(1),
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Apply `rows` (input position, row) as one transaction on `conn`
    ///
    /// A store error rolls back the whole group and is returned; rows the
    /// table policy rejects come back as skipped rows in the tally.
    pub async fn apply_group<'a, T, I>(
        &self,
        conn: &mut SqliteConnection,
        rows: I,
    ) -> Result<LoadTally, sqlx::Error>
    where
        T: Upsert + 'a,
        I: IntoIterator<Item = (usize, &'a T)>,
        I::IntoIter: Send,
    {
        let mut tally = LoadTally::default();
        let mut tx = begin_monitored(conn, T::TABLE).await?;

        for (row, record) in rows {
            match record.apply(tx.conn()).await? {
                UpsertOutcome::Inserted => tally.inserted += 1,
                UpsertOutcome::Updated => tally.updated += 1,
                UpsertOutcome::Skipped(issue) => tally.skip(row, record.natural_key(), issue),
            }
        }

        tx.commit().await?;

        tracing::debug!(
            table = T::TABLE,
            inserted = tally.inserted,
            updated = tally.updated,
            skipped = tally.skipped,
            "Upsert group committed"
        );

        Ok(tally)
    }

    /// Apply every row, one transaction per group, on a single connection
    ///
    /// A failed group is recorded and the next group still runs.
    pub async fn upsert_batch<T: Upsert>(&self, pool: &SqlitePool, rows: &[T]) -> UpsertReport {
        let mut conn = WorkerConnection::new(pool.clone());
        let mut report = UpsertReport::default();

        for (index, group) in rows.chunks(self.group_size).enumerate() {
            let first_row = index * self.group_size;
            let positioned = group.iter().enumerate().map(|(i, row)| (first_row + i, row));

            let result = match conn.get().await {
                Ok(c) => self.apply_group(c, positioned).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(tally) => {
                    report.processed += group.len();
                    report.tally.merge(tally);
                }
                Err(e) => {
                    tracing::warn!(
                        table = T::TABLE,
                        group = index,
                        first_row,
                        end_row = first_row + group.len(),
                        error = %e,
                        "Upsert group rolled back"
                    );
                    conn.discard();
                    report.group_errors.push(ChunkError {
                        chunk: index,
                        first_row,
                        end_row: first_row + group.len(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
