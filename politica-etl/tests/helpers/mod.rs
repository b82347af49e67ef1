//! Test Helper Utilities
//!
//! Shared utilities for testing politica-etl

pub mod db_utils;
pub mod fixtures;

pub use db_utils::{
    candidacy_projection, count_rows, create_test_db, dump_store, CandidacyView, StoreDump,
};
pub use fixtures::{candidacy, options, tally};
