//! Load operations
//!
//! The four operations the binary exposes, each walking one
//! [`PipelineRun`] from IDLE to REPORTING:
//!
//! 1. RESOLVING: seed caches from the store (failure aborts the run)
//! 2. LOADING: split input into chunks and start the workers
//! 3. DRAINING: wait for every chunk
//! 4. REPORTING: assemble the [`LoadSummary`]
//!
//! Only a startup failure returns `Err`; chunk failures and skipped rows end
//! up in the summary.

use crate::db::candidacies::{self, NewCandidacy};
use crate::error::{EtlError, EtlResult};
use crate::models::{
    derive_parties, derive_politicians, CandidacyRow, LoadSummary, LoadTally, PartyNumber,
    PartyRow, PipelineRun, PoliticianKey, PoliticianRow, RowIssueKind, RunState, TallyPartition,
};
use crate::services::aggregator::VoteAggregator;
use crate::services::resolver::{EntityResolver, ResolverCache};
use crate::services::scheduler::{BatchScheduler, Chunk, ChunkWorker};
use crate::services::upsert::UpsertEngine;
use crate::utils::{begin_monitored, WorkerConnection};
use async_trait::async_trait;
use politica_common::config::{EtlSettings, StatusPolicy, DEFAULT_BATCH_SIZE, DEFAULT_MAX_WORKERS};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

/// Tuning for one [`Loader`]
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Rows per chunk (and per upsert transaction)
    pub batch_size: usize,
    pub max_workers: usize,
    pub status_policy: StatusPolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            status_policy: StatusPolicy::default(),
        }
    }
}

impl From<&EtlSettings> for LoadOptions {
    fn from(settings: &EtlSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            max_workers: settings.max_workers,
            status_policy: settings.status_policy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Loader {
    pool: SqlitePool,
    options: LoadOptions,
}

impl Loader {
    pub fn new(pool: SqlitePool, options: LoadOptions) -> Self {
        Self { pool, options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Upsert parties by number
    ///
    /// Duplicate numbers in `rows` collapse to the last occurrence before
    /// dispatch; the dropped duplicates count as skipped. Reported rows keep
    /// their positions in `rows`.
    pub async fn load_parties(&self, rows: Vec<PartyRow>) -> EtlResult<LoadSummary> {
        let mut run = PipelineRun::new("load_parties");
        let mut summary = LoadSummary::new(run.operation);

        // No lookups needed, but the store must answer before anything is dispatched
        self.seed_resolver(&mut run).await?;

        let (rows, collapsed) = collapse_parties(rows);
        summary.skipped += collapsed;

        let worker = PartyWorker {
            conn: WorkerConnection::new(self.pool.clone()),
            engine: UpsertEngine::new(self.options.batch_size),
        };
        self.schedule(&mut run, &mut summary, rows, worker).await?;

        finish(run, summary)
    }

    /// Create politicians that are not stored yet
    ///
    /// Existing politicians are never modified and count as skipped.
    pub async fn load_politicians(&self, rows: Vec<PoliticianRow>) -> EtlResult<LoadSummary> {
        let mut run = PipelineRun::new("load_politicians");
        let mut summary = LoadSummary::new(run.operation);

        let cache = self.seed_resolver(&mut run).await?;

        let total = rows.len();
        let mut seen = HashSet::new();
        let rows: Vec<(usize, PoliticianRow)> = rows
            .into_iter()
            .enumerate()
            .filter(|(_, row)| seen.insert(row.key()))
            .collect();
        summary.skipped += total - rows.len();

        let worker = PoliticianWorker {
            conn: WorkerConnection::new(self.pool.clone()),
            resolver: EntityResolver::new(cache),
            uncommitted: Vec::new(),
        };
        self.schedule(&mut run, &mut summary, rows, worker).await?;

        finish(run, summary)
    }

    /// Load candidacies for `year`, resolving their dimensions
    ///
    /// Rows are skipped (and reported) when their year differs from `year`,
    /// their election turn cannot produce a date, or their party is not
    /// stored. Politicians and elections are created on first encounter.
    pub async fn load_candidacies(&self, rows: Vec<CandidacyRow>, year: i32) -> EtlResult<LoadSummary> {
        let mut run = PipelineRun::new("load_candidacies");
        let mut summary = LoadSummary::new(run.operation);

        let cache = self.seed_resolver(&mut run).await?;

        let worker = CandidacyWorker {
            conn: WorkerConnection::new(self.pool.clone()),
            resolver: EntityResolver::new(cache),
            engine: UpsertEngine::new(self.options.batch_size),
            year,
        };
        let rows: Vec<(usize, CandidacyRow)> = rows.into_iter().enumerate().collect();
        self.schedule(&mut run, &mut summary, rows, worker).await?;

        finish(run, summary)
    }

    /// Sum every partition's tallies, then set each candidate's total once
    pub async fn merge_vote_results(&self, partitions: Vec<TallyPartition>) -> EtlResult<LoadSummary> {
        let mut run = PipelineRun::new("merge_vote_results");
        let mut summary = LoadSummary::new(run.operation);

        run.transition_to(RunState::Resolving)?;
        let known = candidacies::load_external_ids(&self.pool)
            .await
            .map_err(|e| EtlError::Startup(format!("Could not read stored candidacies: {}", e)))?;

        // Step 1: reduce every partition to one result per candidate before
        // touching the store
        let votes = VoteAggregator::aggregate(self.options.status_policy, partitions);
        summary.status_conflicts = votes.status_conflicts.len();
        summary.skipped += votes.unkeyed_rows + votes.rejected.len();
        summary.row_issues.extend(votes.rejected.iter().cloned());
        info!(
            partitions = votes.partitions,
            rows = votes.rows,
            candidates = votes.totals.len(),
            "Vote tallies aggregated"
        );

        let results = votes.into_results();
        let dangling = results.iter().filter(|r| !known.contains(&r.external_id)).count();
        if dangling > 0 {
            tracing::warn!(dangling, "Tallies reference candidates with no stored candidacy");
        }

        // Step 2: one write per candidate
        run.transition_to(RunState::Loading)?;
        let report = UpsertEngine::new(self.options.batch_size)
            .upsert_batch(&self.pool, &results)
            .await;

        // Groups ran inline, so nothing is left in flight
        run.transition_to(RunState::Draining)?;
        summary.processed += report.processed;
        summary.absorb(report.tally);
        summary.chunk_errors.extend(report.group_errors);

        finish(run, summary)
    }

    /// Load one year end to end from a single candidacy file
    ///
    /// Parties (when the rows carry initials and name) and politicians are
    /// derived from the candidacy rows and loaded first; vote partitions are
    /// merged last. Stops at the first operation that cannot start.
    pub async fn load_year(
        &self,
        candidacies: Vec<CandidacyRow>,
        partitions: Vec<TallyPartition>,
        year: i32,
    ) -> EtlResult<Vec<LoadSummary>> {
        let mut summaries = Vec::with_capacity(4);

        let parties = derive_parties(&candidacies);
        if parties.is_empty() {
            info!("Candidacy rows carry no party details; relying on stored parties");
        } else {
            summaries.push(self.load_parties(parties).await?);
        }

        summaries.push(self.load_politicians(derive_politicians(&candidacies)).await?);
        summaries.push(self.load_candidacies(candidacies, year).await?);
        summaries.push(self.merge_vote_results(partitions).await?);

        Ok(summaries)
    }

    async fn seed_resolver(&self, run: &mut PipelineRun) -> EtlResult<ResolverCache> {
        run.transition_to(RunState::Resolving)?;
        ResolverCache::seed(&self.pool)
            .await
            .map_err(|e| EtlError::Startup(format!("Resolver cache seeding failed: {}", e)))
    }

    async fn schedule<T, W>(
        &self,
        run: &mut PipelineRun,
        summary: &mut LoadSummary,
        records: Vec<(usize, T)>,
        prototype: W,
    ) -> EtlResult<()>
    where
        T: Send + Sync + 'static,
        W: ChunkWorker<T>,
    {
        let scheduler = BatchScheduler::new(self.options.batch_size, self.options.max_workers);

        run.transition_to(RunState::Loading)?;
        let dispatched = scheduler.dispatch_positioned(records, &prototype);

        run.transition_to(RunState::Draining)?;
        let report = dispatched.drain().await;

        summary.processed += report.processed;
        summary.absorb(report.tally);
        summary.chunk_errors.extend(report.errors);
        Ok(())
    }
}

fn finish(mut run: PipelineRun, mut summary: LoadSummary) -> EtlResult<LoadSummary> {
    run.transition_to(RunState::Reporting)?;
    summary.final_state = run.state;
    summary.elapsed_ms = run.elapsed_ms();

    info!(
        run_id = %run.run_id,
        operation = run.operation,
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped,
        processed = summary.processed,
        chunk_errors = summary.chunk_errors.len(),
        row_issues = summary.row_issues.len(),
        lost_races = summary.lost_races,
        elapsed_ms = summary.elapsed_ms,
        "Load run complete"
    );

    Ok(summary)
}

/// Keep the last row per party number, in input order and paired with its
/// input position; returns the count dropped
fn collapse_parties(rows: Vec<PartyRow>) -> (Vec<(usize, PartyRow)>, usize) {
    let total = rows.len();
    let last: HashMap<PartyNumber, usize> = rows
        .iter()
        .enumerate()
        .map(|(position, row)| (row.number, position))
        .collect();

    let kept: Vec<(usize, PartyRow)> = rows
        .into_iter()
        .enumerate()
        .filter(|(position, row)| last.get(&row.number) == Some(position))
        .collect();

    let collapsed = total - kept.len();
    (kept, collapsed)
}

#[derive(Clone)]
struct PartyWorker {
    conn: WorkerConnection,
    engine: UpsertEngine,
}

#[async_trait]
impl ChunkWorker<PartyRow> for PartyWorker {
    async fn process(&mut self, chunk: &Chunk<PartyRow>) -> EtlResult<LoadTally> {
        let conn = self.conn.get().await?;
        Ok(self.engine.apply_group(conn, chunk.indexed()).await?)
    }

    fn reset(&mut self) {
        self.conn.discard();
    }
}

#[derive(Clone)]
struct PoliticianWorker {
    conn: WorkerConnection,
    resolver: EntityResolver,
    /// Politicians created by the chunk in flight
    uncommitted: Vec<PoliticianKey>,
}

#[async_trait]
impl ChunkWorker<PoliticianRow> for PoliticianWorker {
    async fn process(&mut self, chunk: &Chunk<PoliticianRow>) -> EtlResult<LoadTally> {
        self.uncommitted.clear();
        let races_before = self.resolver.lost_races();
        let conn = self.conn.get().await?;
        let mut tx = begin_monitored(conn, "politicians").await?;
        let mut tally = LoadTally::default();

        for (row, politician) in chunk.indexed() {
            let key = politician.key();
            if self.resolver.politician(tx.conn(), &key).await?.created {
                tally.inserted += 1;
                self.uncommitted.push(key);
            } else {
                tally.skip(row, key.to_string(), None);
            }
        }

        tx.commit().await?;
        self.uncommitted.clear();
        tally.lost_races = self.resolver.lost_races() - races_before;
        Ok(tally)
    }

    fn reset(&mut self) {
        self.conn.discard();
        // Rolled back with the chunk, so their ids no longer exist
        for key in self.uncommitted.drain(..) {
            self.resolver.forget_politician(&key);
        }
    }
}

#[derive(Clone)]
struct CandidacyWorker {
    conn: WorkerConnection,
    resolver: EntityResolver,
    engine: UpsertEngine,
    year: i32,
}

#[async_trait]
impl ChunkWorker<CandidacyRow> for CandidacyWorker {
    async fn process(&mut self, chunk: &Chunk<CandidacyRow>) -> EtlResult<LoadTally> {
        let races_before = self.resolver.lost_races();
        let conn = self.conn.get().await?;
        let mut tally = LoadTally::default();
        let mut prepared: Vec<(usize, NewCandidacy)> = Vec::with_capacity(chunk.rows.len());

        // Step 1: resolve dimensions (autocommit, so resolved ids are durable
        // even if the candidacy group below rolls back)
        for (row, candidacy) in chunk.indexed() {
            let natural_key = || {
                candidacy
                    .external_id()
                    .map(str::to_string)
                    .unwrap_or_else(|| candidacy.politician_key().to_string())
            };

            if candidacy.year != self.year {
                tally.skip(
                    row,
                    natural_key(),
                    Some(RowIssueKind::YearMismatch {
                        expected: self.year,
                        found: candidacy.year,
                    }),
                );
                continue;
            }

            let election_key = candidacy.election_key();
            if election_key.election_date().is_none() {
                tally.skip(
                    row,
                    natural_key(),
                    Some(RowIssueKind::InvalidElection {
                        year: candidacy.year,
                        turn: candidacy.turn,
                    }),
                );
                continue;
            }

            let Some(party_number) = self.resolver.party(conn, candidacy.party_number).await? else {
                tally.skip(
                    row,
                    natural_key(),
                    Some(RowIssueKind::MissingParty {
                        party_number: candidacy.party_number,
                    }),
                );
                continue;
            };

            let politician = self.resolver.politician(conn, &candidacy.politician_key()).await?;
            let election = self.resolver.election(conn, &election_key).await?;

            prepared.push((
                row,
                NewCandidacy {
                    id: Uuid::new_v4(),
                    politician_id: politician.id,
                    party_number,
                    election_id: election.id,
                    office: candidacy.office.clone(),
                    electoral_number: candidacy.electoral_number,
                    external_sequence_id: candidacy.external_id().map(str::to_string),
                },
            ));
        }

        tally.lost_races = self.resolver.lost_races() - races_before;

        // Step 2: write the chunk's candidacies in one transaction
        if !prepared.is_empty() {
            let group: Vec<(usize, &NewCandidacy)> =
                prepared.iter().map(|(row, candidacy)| (*row, candidacy)).collect();
            let written = self.engine.apply_group(conn, group).await?;
            tally.merge(written);
        }

        Ok(tally)
    }

    fn reset(&mut self) {
        self.conn.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{parties, politicians};
    use tempfile::TempDir;

    #[test]
    fn test_collapse_keeps_last_per_number() {
        let rows = vec![
            PartyRow::new(13, "PT", "A"),
            PartyRow::new(45, "PSDB", "X"),
            PartyRow::new(13, "PT", "B"),
        ];

        let (kept, collapsed) = collapse_parties(rows);

        assert_eq!(collapsed, 1);
        assert_eq!(
            kept,
            vec![(1, PartyRow::new(45, "PSDB", "X")), (2, PartyRow::new(13, "PT", "B"))]
        );
    }

    #[test]
    fn test_options_from_settings() {
        let settings = EtlSettings {
            database_path: "x.db".into(),
            batch_size: 50,
            max_workers: 2,
            status_policy: StatusPolicy::FirstWins,
            log_level: "info".to_string(),
            log_directory: None,
        };
        let options = LoadOptions::from(&settings);
        assert_eq!(options.batch_size, 50);
        assert_eq!(options.max_workers, 2);
        assert_eq!(options.status_policy, StatusPolicy::FirstWins);
    }

    #[tokio::test]
    async fn test_candidacy_chunk_reports_lost_races() {
        let dir = TempDir::new().unwrap();
        let pool = politica_common::db::init_database(&dir.path().join("t.db"), 3)
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        parties::insert_party_if_absent(&mut conn, &PartyRow::new(13, "PT", "A"))
            .await
            .unwrap();
        let cache = ResolverCache::seed(&pool).await.unwrap();

        // Stored by someone else after the snapshot was taken
        let key = PoliticianKey::new("ANA SOUZA", "ANA");
        politicians::insert_politician_if_absent(&mut conn, &key, Uuid::new_v4())
            .await
            .unwrap();
        drop(conn);

        let mut worker = CandidacyWorker {
            conn: WorkerConnection::new(pool.clone()),
            resolver: EntityResolver::new(cache),
            engine: UpsertEngine::new(10),
            year: 2022,
        };
        let chunk = Chunk {
            index: 0,
            positions: vec![0],
            rows: vec![CandidacyRow {
                full_name: "ANA SOUZA".to_string(),
                ballot_nickname: "ANA".to_string(),
                party_number: 13,
                year: 2022,
                turn: 1,
                type_label: "ELEIÇÃO ORDINÁRIA".to_string(),
                office: "SENADOR".to_string(),
                electoral_number: 131,
                external_sequence_id: "001".to_string(),
                party_initials: None,
                party_name: None,
            }],
        };

        let tally = worker.process(&chunk).await.unwrap();

        assert_eq!(tally.inserted, 1);
        assert_eq!(tally.lost_races, 1);
    }
}
