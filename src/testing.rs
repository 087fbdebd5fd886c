//! Test doubles for the completion service and the database endpoint
//!
//! Both fakes record every call so tests can assert on what reached the
//! outbound boundary (or that nothing did).

use crate::db::{DatabaseEndpoint, RemoteError, RemoteResult};
use crate::error::{LucyError, Result};
use crate::llm::{CompletionRequest, CompletionService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Completion service answering from canned responses keyed by schema name
#[derive(Default)]
pub struct FakeCompletion {
    by_schema: HashMap<String, std::result::Result<serde_json::Value, String>>,
    fallback: Option<std::result::Result<serde_json::Value, String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `value`
    pub fn returning(value: serde_json::Value) -> Self {
        Self {
            fallback: Some(Ok(value)),
            ..Self::default()
        }
    }

    /// Fail every request with an LLM error carrying `message`
    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Some(Err(message.to_string())),
            ..Self::default()
        }
    }

    pub fn respond(mut self, schema: &str, value: serde_json::Value) -> Self {
        self.by_schema.insert(schema.to_string(), Ok(value));
        self
    }

    pub fn fail(mut self, schema: &str, message: &str) -> Self {
        self.by_schema.insert(schema.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests().pop()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn generate_object(&self, request: &CompletionRequest) -> Result<serde_json::Value> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let canned = self
            .by_schema
            .get(&request.schema.name)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| LucyError::Llm(format!("No canned response for schema {}", request.schema.name)))?;
        canned.map_err(LucyError::Llm)
    }
}

/// Database endpoint with a fixed `execute_query` answer and per-table reads
pub struct FakeDatabase {
    rpc: RemoteResult<Option<serde_json::Value>>,
    rpc_overrides: HashMap<String, RemoteResult<Option<serde_json::Value>>>,
    tables: HashMap<String, RemoteResult<serde_json::Value>>,
    queries: Mutex<Vec<String>>,
    selects: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn returning(payload: Option<serde_json::Value>) -> Self {
        Self {
            rpc: Ok(payload),
            rpc_overrides: HashMap::new(),
            tables: HashMap::new(),
            queries: Mutex::new(Vec::new()),
            selects: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: RemoteError) -> Self {
        let mut db = Self::returning(None);
        db.rpc = Err(error);
        db
    }

    /// Answer `execute_query` for exactly `query_text` with `result`
    pub fn on_query(mut self, query_text: &str, result: RemoteResult<Option<serde_json::Value>>) -> Self {
        self.rpc_overrides.insert(query_text.to_string(), result);
        self
    }

    pub fn with_table(mut self, table: &str, result: RemoteResult<serde_json::Value>) -> Self {
        self.tables.insert(table.to_string(), result);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn selects(&self) -> Vec<String> {
        self.selects.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseEndpoint for FakeDatabase {
    async fn execute_query(&self, query_text: &str) -> RemoteResult<Option<serde_json::Value>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query_text.to_string());
        }
        self.rpc_overrides
            .get(query_text)
            .cloned()
            .unwrap_or_else(|| self.rpc.clone())
    }

    async fn select(&self, table: &str, columns: &str, limit: usize) -> RemoteResult<serde_json::Value> {
        if let Ok(mut selects) = self.selects.lock() {
            selects.push(format!("{}?select={}&limit={}", table, columns, limit));
        }
        self.tables
            .get(table)
            .cloned()
            .unwrap_or_else(|| Ok(serde_json::json!([])))
    }
}
