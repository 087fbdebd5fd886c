//! Lucy analytics core
//!
//! Natural-language questions become validated, row-capped SELECT statements,
//! run through the database's `execute_query` procedure, and come back with
//! optional clause-by-clause explanations and chart recommendations.

pub mod catalog;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod execution;
pub mod explain;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod query_generator;
pub mod server;
pub mod sql_guard;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{LucyError, Result};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
