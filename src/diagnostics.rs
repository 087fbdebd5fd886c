//! Connectivity Diagnostic - One-shot health check of the database path
//!
//! Steps run in order and stop at the first failure:
//! 1. bounded read of `credits`
//! 2. `execute_query` with a no-op statement
//! 3. read of the user-scoped credit columns
//!
//! The diagnostic never returns an error; every failure becomes a report with
//! `success = false`.

use crate::db::{DatabaseEndpoint, RemoteError};
use crate::execution::error_payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

pub const DIAGNOSTIC_TABLE: &str = "credits";
pub const RPC_PROBE_QUERY: &str = "SELECT 1 as test";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub success: bool,
    pub message: String,
    pub details: serde_json::Map<String, serde_json::Value>,
    pub checked_at: DateTime<Utc>,
}

impl DiagnosticReport {
    fn failure(step: &DiagnosticStep, err: &RemoteError, mut details: serde_json::Map<String, serde_json::Value>) -> Self {
        details.insert("failedStep".to_string(), serde_json::Value::String(step.key.to_string()));
        details.insert("error".to_string(), err.to_json());
        Self {
            success: false,
            message: format!("{} failed: {}", step.label, err.message),
            details,
            checked_at: Utc::now(),
        }
    }
}

struct DiagnosticStep {
    key: &'static str,
    label: &'static str,
}

const STEPS: [DiagnosticStep; 3] = [
    DiagnosticStep { key: "basicTest", label: "Basic connection" },
    DiagnosticStep { key: "rpcTest", label: "RPC function test" },
    DiagnosticStep { key: "authTest", label: "Auth access test" },
];

pub struct ConnectivityDiagnostic {
    db: Arc<dyn DatabaseEndpoint>,
}

impl ConnectivityDiagnostic {
    pub fn new(db: Arc<dyn DatabaseEndpoint>) -> Self {
        Self { db }
    }

    async fn run_step(&self, index: usize) -> Result<serde_json::Value, RemoteError> {
        match index {
            0 => self.db.select(DIAGNOSTIC_TABLE, "id", 1).await,
            1 => {
                let payload = self
                    .db
                    .execute_query(RPC_PROBE_QUERY)
                    .await?
                    .unwrap_or(serde_json::Value::Null);
                // The procedure reports SQL failures in-band
                match error_payload(&payload) {
                    Some(message) => Err(RemoteError::new(message)),
                    None => Ok(payload),
                }
            }
            _ => self.db.select(DIAGNOSTIC_TABLE, "id,user_id,credits", 1).await,
        }
    }

    pub async fn test_database_connection(&self) -> DiagnosticReport {
        info!("Testing database connection...");
        let mut details = serde_json::Map::new();

        for (index, step) in STEPS.iter().enumerate() {
            match self.run_step(index).await {
                Ok(result) => {
                    info!("{}: ok", step.label);
                    details.insert(step.key.to_string(), result);
                }
                Err(err) => {
                    error!("{} failed: {}", step.label, err);
                    return DiagnosticReport::failure(step, &err, details);
                }
            }
        }

        DiagnosticReport {
            success: true,
            message: "Database connection successful".to_string(),
            details,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDatabase;
    use serde_json::json;

    #[tokio::test]
    async fn test_all_steps_pass() {
        let db = Arc::new(
            FakeDatabase::returning(Some(json!([{"test": 1}])))
                .with_table("credits", Ok(json!([{"id": 7, "user_id": "u1", "credits": 30}]))),
        );
        let report = ConnectivityDiagnostic::new(db.clone()).test_database_connection().await;
        assert!(report.success);
        assert_eq!(report.message, "Database connection successful");
        assert_eq!(report.details["rpcTest"], json!([{"test": 1}]));
        assert!(report.details.contains_key("basicTest"));
        assert!(report.details.contains_key("authTest"));
        assert_eq!(db.queries(), vec![RPC_PROBE_QUERY.to_string()]);
        assert_eq!(
            db.selects(),
            vec!["credits?select=id&limit=1", "credits?select=id,user_id,credits&limit=1"]
        );
    }

    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        let db = Arc::new(
            FakeDatabase::returning(Some(json!([{"test": 1}])))
                .with_table("credits", Err(RemoteError::new("relation \"credits\" does not exist"))),
        );
        let report = ConnectivityDiagnostic::new(db.clone()).test_database_connection().await;
        assert!(!report.success);
        assert_eq!(
            report.message,
            "Basic connection failed: relation \"credits\" does not exist"
        );
        assert_eq!(report.details["failedStep"], "basicTest");
        assert!(db.queries().is_empty());
    }

    #[tokio::test]
    async fn test_rpc_failure_reported() {
        let db = Arc::new(FakeDatabase::failing(
            RemoteError::new("Could not find the function public.execute_query").with_status(404),
        ));
        let report = ConnectivityDiagnostic::new(db.clone()).test_database_connection().await;
        assert!(!report.success);
        assert!(report.message.starts_with("RPC function test failed"));
        assert_eq!(report.details["error"]["status"], 404);
        assert!(report.details.contains_key("basicTest"));
        assert_eq!(db.selects().len(), 1);
    }

    #[tokio::test]
    async fn test_rpc_error_payload_fails_step() {
        let db = Arc::new(FakeDatabase::returning(Some(json!({
            "error": "permission denied for function execute_query"
        }))));
        let report = ConnectivityDiagnostic::new(db.clone()).test_database_connection().await;
        assert!(!report.success);
        assert_eq!(
            report.message,
            "RPC function test failed: permission denied for function execute_query"
        );
        assert_eq!(report.details["failedStep"], "rpcTest");
        assert!(!report.details.contains_key("rpcTest"));
        assert_eq!(db.selects().len(), 1);
    }
}
