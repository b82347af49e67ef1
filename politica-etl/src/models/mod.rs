//! Data models for politica-etl
//!
//! - Typed input rows and the natural keys derived from them
//! - Run state machine and per-run summaries
//! - The built-in party catalog

pub mod keys;
pub mod party_catalog;
pub mod records;
pub mod run_state;
pub mod summary;

pub use keys::{ElectionKey, PartyNumber, PoliticianKey};
pub use records::{
    derive_parties, derive_politicians, CandidacyRow, PartyRow, PoliticianRow, TallyPartition,
    VoteTallyRow,
};
pub use run_state::{PipelineRun, RunState, StateTransition};
pub use summary::{ChunkError, LoadSummary, LoadTally, RowIssue, RowIssueKind};
