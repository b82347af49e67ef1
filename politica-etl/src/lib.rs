//! politica-etl - Electoral records loader
//!
//! Reconciles party, politician, election, candidacy and vote-tally rows
//! into the normalized store by natural key. Every load operation is
//! idempotent: rerunning it on the same input leaves the store unchanged.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod source;
pub mod utils;

pub use error::{EtlError, EtlResult};
pub use services::loader::{LoadOptions, Loader};
