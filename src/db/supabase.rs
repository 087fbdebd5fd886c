//! Supabase (PostgREST) client
//!
//! REST API:
//! - POST {url}/rest/v1/rpc/execute_query with `{"query_text": ...}`
//! - GET  {url}/rest/v1/{table}?select=...&limit=...
//! Headers: apikey, Authorization: Bearer (service role key)

use super::{DatabaseEndpoint, RemoteError, RemoteResult};
use crate::config::SupabaseConfig;
use crate::error::{LucyError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

pub const EXECUTE_QUERY_PROCEDURE: &str = "execute_query";

#[derive(Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_role_key: String,
    client: Client,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LucyError::Database(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    /// Turn a non-success response into a [`RemoteError`], keeping PostgREST's
    /// `code`/`details`/`hint` when the body carries them.
    async fn error_from_response(response: Response) -> RemoteError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<RemoteError>(&text).ok();
        match parsed {
            Some(err) => err.with_status(status.as_u16()),
            None if text.trim().is_empty() => {
                RemoteError::new(format!("Request failed with status {}", status)).with_status(status.as_u16())
            }
            None => RemoteError::new(text).with_status(status.as_u16()),
        }
    }
}

#[async_trait]
impl DatabaseEndpoint for SupabaseClient {
    async fn execute_query(&self, query_text: &str) -> RemoteResult<Option<serde_json::Value>> {
        let response = self
            .client
            .post(self.rest_url(&format!("rpc/{}", EXECUTE_QUERY_PROCEDURE)))
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "query_text": query_text }))
            .send()
            .await
            .map_err(|e| RemoteError::new(format!("Failed to call {}: {}", EXECUTE_QUERY_PROCEDURE, e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::new(format!("Failed to read response body: {}", e)))?;
        debug!("execute_query returned {} bytes", body.len());

        if body.trim().is_empty() {
            return Ok(None);
        }
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| RemoteError::new(format!("Failed to parse response body: {}", e)))?;
        Ok(match value {
            serde_json::Value::Null => None,
            other => Some(other),
        })
    }

    async fn select(&self, table: &str, columns: &str, limit: usize) -> RemoteResult<serde_json::Value> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.rest_url(table))
            .query(&[("select", columns), ("limit", limit.as_str())])
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .send()
            .await
            .map_err(|e| RemoteError::new(format!("Failed to read {}: {}", table, e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::new(format!("Failed to parse {} rows: {}", table, e)))
    }
}
