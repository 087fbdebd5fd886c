//! Query Generator - Natural language to validated SQL
//!
//! Flow: prompt -> structured completion `{query}` -> row cap -> SELECT check
//! -> catalog check. No retries; the first failure is returned as a
//! generation error.

use crate::catalog::SchemaCatalog;
use crate::error::{LucyError, Result};
use crate::llm::{self, CompletionRequest, CompletionService, OutputSchema};
use crate::prompts;
use crate::sql_guard::{self, CatalogCheck, CatalogPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// SQL produced for one request, plus the outcome of the catalog check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_check: Option<CatalogCheck>,
}

#[derive(Debug, Deserialize)]
struct QueryObject {
    query: String,
}

pub fn query_schema() -> OutputSchema {
    OutputSchema::new(
        "sql_query",
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    )
}

/// Row cap and SELECT-only check applied to raw model output
pub fn post_process(raw: &str, row_limit: u32) -> Result<String> {
    let sql = sql_guard::ensure_row_limit(raw, row_limit);
    sql_guard::ensure_select(&sql)?;
    Ok(sql)
}

pub struct QueryGenerator {
    llm: Arc<dyn CompletionService>,
    catalog: Arc<SchemaCatalog>,
    model: String,
    row_limit: u32,
    policy: CatalogPolicy,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn CompletionService>, catalog: Arc<SchemaCatalog>, model: String) -> Self {
        Self {
            llm,
            catalog,
            model,
            row_limit: crate::config::DEFAULT_ROW_LIMIT,
            policy: CatalogPolicy::default(),
        }
    }

    pub fn with_row_limit(mut self, row_limit: u32) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn with_policy(mut self, policy: CatalogPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn request_for(&self, input: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            system: prompts::query_system_prompt(&self.catalog),
            prompt: prompts::query_task_prompt(input),
            schema: query_schema(),
        }
    }

    pub async fn generate_query(&self, input: &str) -> Result<GeneratedQuery> {
        if input.trim().is_empty() {
            return Err(LucyError::Input("Query cannot be empty".to_string()));
        }

        let result = self.generate_inner(input).await;
        if let Err(e) = &result {
            error!("Query generation error: {}", e);
        }
        result
    }

    async fn generate_inner(&self, input: &str) -> Result<GeneratedQuery> {
        let request = self.request_for(input);
        let object: QueryObject = llm::generate(self.llm.as_ref(), &request)
            .await
            .map_err(|e| LucyError::Generation(e.to_string()))?;

        let sql = post_process(&object.query, self.row_limit)?;

        let catalog_check = match self.policy {
            CatalogPolicy::Off => None,
            policy => {
                let check = CatalogCheck::run(&sql, &self.catalog);
                check.apply(policy)?;
                Some(check)
            }
        };

        info!("Generated query: {}", sql);
        Ok(GeneratedQuery { sql, catalog_check })
    }
}
