//! Load pipeline services
//!
//! - `resolver`: natural key → store id, with per-worker caches
//! - `upsert`: idempotent per-table writes applied in transactional groups
//! - `scheduler`: chunking and the worker pool
//! - `aggregator`: vote-tally reduction across partitions
//! - `loader`: the four load operations built from the above

pub mod aggregator;
pub mod loader;
pub mod resolver;
pub mod scheduler;
pub mod upsert;

pub use aggregator::{AggregatedVotes, CandidateTotal, StatusConflict, VoteAggregator};
pub use loader::{LoadOptions, Loader};
pub use resolver::{EntityResolver, Resolved, ResolutionError, ResolverCache};
pub use scheduler::{BatchScheduler, Chunk, ChunkWorker, Dispatched, ScheduleReport};
pub use upsert::{Upsert, UpsertEngine, UpsertOutcome, UpsertReport};
