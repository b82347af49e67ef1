//! Batch scheduling
//!
//! Splits a record sequence into contiguous fixed-size chunks and runs them
//! on a pool of long-lived workers. Each worker is cloned from a prototype
//! at dispatch, so it starts with its own resolver snapshot and its own
//! (not yet acquired) store connection, and keeps both across the chunks it
//! pulls from the shared queue.
//!
//! A chunk either commits as a whole or is reported as a [`ChunkError`]
//! naming its row range. Errors and panics in one chunk never stop the run.

use crate::error::{EtlError, EtlResult};
use crate::models::{ChunkError, LoadTally};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Contiguous slice of the dispatched sequence
#[derive(Debug, Clone)]
pub struct Chunk<T> {
    pub index: usize,
    /// Input position of each row (ascending, gaps where rows were dropped
    /// before dispatch)
    pub positions: Vec<usize>,
    pub rows: Vec<T>,
}

impl<T> Chunk<T> {
    /// Input position of the first row
    pub fn first_row(&self) -> usize {
        self.positions.first().copied().unwrap_or(0)
    }

    /// One past the input position of the last row
    pub fn end_row(&self) -> usize {
        self.positions.last().map_or(self.first_row(), |last| last + 1)
    }

    /// Rows paired with their input positions
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &T)> + Send + '_
    where
        T: Sync,
    {
        self.positions.iter().copied().zip(self.rows.iter())
    }
}

/// Per-worker chunk processing
///
/// `process` must leave the store untouched when it returns an error (run
/// the chunk's writes in one transaction).
#[async_trait]
pub trait ChunkWorker<T>: Clone + Send + 'static
where
    T: Send + Sync + 'static,
{
    async fn process(&mut self, chunk: &Chunk<T>) -> EtlResult<LoadTally>;

    /// Called after `process` failed, before the worker's next chunk
    fn reset(&mut self) {}
}

#[derive(Debug, Default)]
pub struct ScheduleReport {
    pub chunks: usize,
    /// Rows in chunks that committed
    pub processed: usize,
    pub tally: LoadTally,
    /// Failed chunks, ordered by chunk index
    pub errors: Vec<ChunkError>,
}

struct ChunkOutcome {
    index: usize,
    rows: usize,
    result: Result<LoadTally, String>,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    chunk_size: usize,
    worker_count: usize,
}

impl BatchScheduler {
    pub fn new(chunk_size: usize, worker_count: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            worker_count: worker_count.max(1),
        }
    }

    /// Contiguous chunks of at most `chunk_size` rows, in input order
    pub fn split<T>(&self, records: Vec<T>) -> Vec<Chunk<T>> {
        self.split_positioned(records.into_iter().enumerate().collect())
    }

    /// Like [`split`](Self::split), for records that carry their own input
    /// position
    pub fn split_positioned<T>(&self, records: Vec<(usize, T)>) -> Vec<Chunk<T>> {
        let mut chunks = Vec::with_capacity(records.len().div_ceil(self.chunk_size));
        let mut rest = records.into_iter().peekable();

        while rest.peek().is_some() {
            let (positions, rows): (Vec<usize>, Vec<T>) =
                rest.by_ref().take(self.chunk_size).unzip();
            chunks.push(Chunk {
                index: chunks.len(),
                positions,
                rows,
            });
        }

        chunks
    }

    /// Queue all chunks and start the workers
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch<T, W>(&self, records: Vec<T>, prototype: &W) -> Dispatched
    where
        T: Send + Sync + 'static,
        W: ChunkWorker<T>,
    {
        self.dispatch_positioned(records.into_iter().enumerate().collect(), prototype)
    }

    /// Queue records paired with their input positions and start the workers
    ///
    /// Row issues and chunk errors report these positions, so callers that
    /// drop rows before dispatch still point into their own input.
    pub fn dispatch_positioned<T, W>(&self, records: Vec<(usize, T)>, prototype: &W) -> Dispatched
    where
        T: Send + Sync + 'static,
        W: ChunkWorker<T>,
    {
        let chunks = self.split_positioned(records);
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.first_row(), c.end_row())).collect();
        let worker_count = self.worker_count.min(chunks.len()).max(1);
        let queue = Arc::new(Mutex::new(VecDeque::from(chunks)));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let fresh = prototype.clone();
            let mut worker = fresh.clone();

            workers.spawn(async move {
                while let Some(chunk) = next_chunk(&queue) {
                    let caught = AssertUnwindSafe(worker.process(&chunk)).catch_unwind().await;
                    let result = match caught {
                        Ok(Ok(tally)) => Ok(tally),
                        Ok(Err(e)) => {
                            worker.reset();
                            Err(e.to_string())
                        }
                        Err(payload) => {
                            // State may be half-updated; start over from the prototype
                            worker = fresh.clone();
                            Err(EtlError::WorkerPanic(panic_message(&*payload)).to_string())
                        }
                    };

                    if let Err(message) = &result {
                        tracing::warn!(
                            worker_id,
                            chunk = chunk.index,
                            first_row = chunk.first_row(),
                            end_row = chunk.end_row(),
                            error = %message,
                            "Chunk failed"
                        );
                    }

                    let outcome = ChunkOutcome {
                        index: chunk.index,
                        rows: chunk.rows.len(),
                        result,
                    };
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
                tracing::debug!(worker_id, "Worker finished");
            });
        }

        tracing::info!(
            chunks = spans.len(),
            workers = worker_count,
            chunk_size = self.chunk_size,
            "Chunks dispatched"
        );

        Dispatched {
            workers,
            outcomes: rx,
            spans,
            started: Instant::now(),
        }
    }

    /// Dispatch and wait for every chunk
    pub async fn run<T, W>(&self, records: Vec<T>, prototype: &W) -> ScheduleReport
    where
        T: Send + Sync + 'static,
        W: ChunkWorker<T>,
    {
        self.dispatch(records, prototype).drain().await
    }
}

/// Chunks in flight
pub struct Dispatched {
    workers: JoinSet<()>,
    outcomes: mpsc::UnboundedReceiver<ChunkOutcome>,
    spans: Vec<(usize, usize)>,
    started: Instant,
}

impl Dispatched {
    /// Wait for every worker and assemble the report
    pub async fn drain(mut self) -> ScheduleReport {
        let total = self.spans.len();
        let mut results: Vec<Option<Result<LoadTally, String>>> = (0..total).map(|_| None).collect();
        let mut processed = 0;

        // Channel closes once every worker has dropped its sender
        while let Some(outcome) = self.outcomes.recv().await {
            if outcome.result.is_ok() {
                processed += outcome.rows;
            }
            results[outcome.index] = Some(outcome.result);
            tracing::debug!(
                chunk = outcome.index,
                completed = results.iter().filter(|r| r.is_some()).count(),
                total,
                "Chunk completed"
            );
        }

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task terminated abnormally");
            }
        }

        let mut report = ScheduleReport {
            chunks: total,
            processed,
            ..Default::default()
        };

        for (index, result) in results.into_iter().enumerate() {
            let (first_row, end_row) = self.spans[index];
            let message = match result {
                Some(Ok(tally)) => {
                    report.tally.merge(tally);
                    continue;
                }
                Some(Err(message)) => message,
                None => "Chunk was never completed (worker lost)".to_string(),
            };
            report.errors.push(ChunkError {
                chunk: index,
                first_row,
                end_row,
                message,
            });
        }

        tracing::info!(
            chunks = total,
            failed = report.errors.len(),
            processed = report.processed,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "All chunks drained"
        );

        report
    }
}

fn next_chunk<T>(queue: &Mutex<VecDeque<Chunk<T>>>) -> Option<Chunk<T>> {
    // A poisoned queue still holds valid chunks
    let mut guard = queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.pop_front()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts rows as inserted; fails or panics on marked values
    #[derive(Clone)]
    struct FakeWorker {
        resets: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChunkWorker<i64> for FakeWorker {
        async fn process(&mut self, chunk: &Chunk<i64>) -> EtlResult<LoadTally> {
            tokio::task::yield_now().await;
            if chunk.rows.contains(&-1) {
                return Err(EtlError::Startup("bad chunk".to_string()));
            }
            if chunk.rows.contains(&-2) {
                panic!("worker exploded");
            }
            let mut tally = LoadTally::default();
            for (row, value) in chunk.indexed() {
                if *value == 0 {
                    tally.skip(row, "zero", None);
                } else {
                    tally.inserted += 1;
                }
            }
            Ok(tally)
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn worker() -> FakeWorker {
        FakeWorker {
            resets: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[test]
    fn test_split_is_contiguous() {
        let chunks = BatchScheduler::new(3, 2).split((0..8).collect::<Vec<i64>>());

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].rows, vec![0, 1, 2]);
        assert_eq!(chunks[2].rows, vec![6, 7]);
        assert_eq!(chunks[2].first_row(), 6);
        assert_eq!(chunks[2].end_row(), 8);
        let positions: Vec<usize> = chunks[1].indexed().map(|(i, _)| i).collect();
        assert_eq!(positions, vec![3, 4, 5]);
    }

    #[test]
    fn test_split_keeps_supplied_positions() {
        let records: Vec<(usize, i64)> = vec![(0, 10), (2, 12), (3, 13), (7, 17)];
        let chunks = BatchScheduler::new(2, 1).split_positioned(records);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].positions, vec![0, 2]);
        assert_eq!((chunks[1].first_row(), chunks[1].end_row()), (3, 8));
        let indexed: Vec<(usize, i64)> = chunks[1].indexed().map(|(i, v)| (i, *v)).collect();
        assert_eq!(indexed, vec![(3, 13), (7, 17)]);
    }

    #[tokio::test]
    async fn test_failed_chunk_reports_supplied_positions() {
        let records: Vec<(usize, i64)> = vec![(1, 1), (4, 2), (5, -1), (9, 3)];
        let report = BatchScheduler::new(2, 2)
            .dispatch_positioned(records, &worker())
            .drain()
            .await;

        assert_eq!(report.errors.len(), 1);
        let error = &report.errors[0];
        assert_eq!((error.chunk, error.first_row, error.end_row), (1, 5, 10));
        assert_eq!(report.processed, 2);
    }

    #[test]
    fn test_split_empty_input() {
        assert!(BatchScheduler::new(10, 4).split(Vec::<i64>::new()).is_empty());
    }

    #[tokio::test]
    async fn test_run_counts_every_row() {
        let records: Vec<i64> = (1..=25).collect();
        let report = BatchScheduler::new(4, 3).run(records, &worker()).await;

        assert_eq!(report.chunks, 7);
        assert_eq!(report.processed, 25);
        assert_eq!(report.tally.inserted, 25);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_failed_chunk_is_isolated() {
        let mut records: Vec<i64> = (1..=12).collect();
        records[5] = -1;
        let prototype = worker();
        let report = BatchScheduler::new(4, 2).run(records, &prototype).await;

        assert_eq!(report.errors.len(), 1);
        let error = &report.errors[0];
        assert_eq!((error.chunk, error.first_row, error.end_row), (1, 4, 8));
        assert_eq!(report.processed, 8);
        assert_eq!(report.tally.inserted, 8);
        assert_eq!(prototype.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_chunk_is_isolated() {
        let mut records: Vec<i64> = (1..=9).collect();
        records[0] = -2;
        records[7] = 0;
        let report = BatchScheduler::new(3, 1).run(records, &worker()).await;

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].chunk, 0);
        assert!(report.errors[0].message.contains("worker exploded"));
        // The single worker survived to process the remaining chunks
        assert_eq!(report.processed, 6);
        assert_eq!(report.tally.inserted, 5);
        assert_eq!(report.tally.skipped, 1);
    }

    #[tokio::test]
    async fn test_errors_sorted_by_chunk() {
        let records: Vec<i64> = vec![-1, 1, -1, 1, -1, 1];
        let report = BatchScheduler::new(1, 4).run(records, &worker()).await;

        let failed: Vec<usize> = report.errors.iter().map(|e| e.chunk).collect();
        assert_eq!(failed, vec![0, 2, 4]);
        assert_eq!(report.processed, 3);
    }
}
