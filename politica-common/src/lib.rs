//! # Politica Common Library
//!
//! Shared code for the politica loader crates:
//! - Error and result types
//! - Bootstrap configuration (TOML file, defaults, precedence)
//! - Database initialization and schema

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
