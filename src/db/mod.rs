//! Database module for the hosted Postgres backend
//!
//! All table access goes through a [`DatabaseEndpoint`]: the generic
//! `execute_query` remote procedure for analytics SQL, plus bounded table
//! reads used by the connectivity diagnostic.

pub mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use supabase::SupabaseClient;

/// Error reported by the remote endpoint or the transport in front of it
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
            hint: None,
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "message": self.message }))
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Remote execution endpoint for the managed database.
///
/// One long-lived instance is created per process and shared by every
/// pipeline stage.
#[async_trait]
pub trait DatabaseEndpoint: Send + Sync {
    /// Invoke the `execute_query` procedure with `query_text`.
    ///
    /// `Ok(None)` means the procedure returned no payload.
    async fn execute_query(&self, query_text: &str) -> RemoteResult<Option<serde_json::Value>>;

    /// Bounded read of `columns` from `table`.
    async fn select(&self, table: &str, columns: &str, limit: usize) -> RemoteResult<serde_json::Value>;
}
