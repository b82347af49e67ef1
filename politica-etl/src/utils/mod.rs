//! Utility modules for politica-etl

pub mod pool_monitor;
pub mod worker_connection;

pub use pool_monitor::{begin_monitored, MonitoredTransaction};
pub use worker_connection::WorkerConnection;
