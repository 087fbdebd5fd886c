//! Query Executor - Runs SQL through the remote `execute_query` procedure
//!
//! The procedure's response shape is not contracted: it may be an array of
//! rows, a bare object for single-row results, or nothing at all.
//! [`normalize_rows`] folds all three into a [`ResultSet`].

use crate::db::DatabaseEndpoint;
use crate::error::{LucyError, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

/// One result row: column name -> scalar value
pub type ResultRow = serde_json::Map<String, Value>;

/// Ordered rows of one execution. Rows are not required to share columns.
pub type ResultSet = Vec<ResultRow>;

/// Normalize an `execute_query` payload into rows.
///
/// - no payload / `null` -> empty set
/// - array -> the array's rows, order kept
/// - single object -> one-element set
pub fn normalize_rows(payload: Option<Value>) -> Result<ResultSet> {
    match payload {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(LucyError::Execution(format!(
                    "Unexpected row shape at index {}: {}",
                    idx, other
                ))),
            })
            .collect(),
        Some(Value::Object(row)) => Ok(vec![row]),
        Some(other) => Err(LucyError::Execution(format!("Unexpected response shape: {}", other))),
    }
}

/// Error reported inside a successful response body.
///
/// Some `execute_query` definitions catch the SQL exception and return
/// `{"error": "<message>"}` instead of raising.
pub fn error_payload(payload: &Value) -> Option<&str> {
    match payload {
        Value::Object(map) if map.len() == 1 => map.get("error").and_then(Value::as_str),
        _ => None,
    }
}

pub struct QueryExecutor {
    db: Arc<dyn DatabaseEndpoint>,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn DatabaseEndpoint>) -> Self {
        Self { db }
    }

    pub async fn execute_query(&self, sql: &str) -> Result<ResultSet> {
        if sql.trim().is_empty() {
            return Err(LucyError::Input("Query cannot be empty".to_string()));
        }

        info!("Starting query execution: {}", sql);

        let payload = self.db.execute_query(sql).await.map_err(|e| {
            error!("RPC error: {}", e);
            LucyError::Execution(format!("Database error: {}", e))
        })?;

        if let Some(message) = payload.as_ref().and_then(error_payload) {
            error!("RPC returned error payload: {}", message);
            return Err(LucyError::Execution(format!("Database error: {}", message)));
        }

        if payload.is_none() {
            debug!("No data returned");
        }

        let rows = normalize_rows(payload)?;
        info!("Query returned {} rows", rows.len());
        Ok(rows)
    }
}
