//! `rowlink-engine` — Rule-based two-table record reconciliation.
//!
//! Pure engine crate: receives pre-loaded tables, returns matched and
//! unmatched partitions plus summary statistics. No CLI dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod filter;
pub mod index;
pub mod model;
pub mod report;
pub mod rule;
pub mod store;

pub use config::{MatchMode, MatchType, ReconcileConfig};
pub use engine::{load_csv_table, load_json_table, run};
pub use error::{CoercionWarning, ReconError};
pub use model::{ReconResult, Row, Side, Table, Value};
pub use store::{MemoryResultStore, ResultStore};
