use crate::error::{LucyError, Result};
use crate::llm::{self, CompletionRequest, CompletionService, OutputSchema};
use crate::prompts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// One clause-level step of a query walkthrough
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryExplanation {
    pub section: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub explanations: Vec<QueryExplanation>,
}

pub fn explanation_schema() -> OutputSchema {
    OutputSchema::new(
        "query_explanation",
        serde_json::json!({
            "type": "object",
            "properties": {
                "explanations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "section": { "type": "string" },
                            "explanation": { "type": "string" }
                        },
                        "required": ["section", "explanation"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["explanations"],
            "additionalProperties": false
        }),
    )
}

pub struct ExplanationGenerator {
    llm: Arc<dyn CompletionService>,
    model: String,
}

impl ExplanationGenerator {
    pub fn new(llm: Arc<dyn CompletionService>, model: String) -> Self {
        Self { llm, model }
    }

    pub async fn explain_query(&self, input: &str, sql: &str) -> Result<Explanation> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: prompts::EXPLAIN_SYSTEM_PROMPT.to_string(),
            prompt: prompts::explain_task_prompt(input, sql),
            schema: explanation_schema(),
        };

        llm::generate(self.llm.as_ref(), &request).await.map_err(|e| {
            error!("Explanation error: {}", e);
            LucyError::Explanation(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCompletion;
    use serde_json::json;

    #[tokio::test]
    async fn test_sections_passed_through_in_order() {
        let fake = Arc::new(FakeCompletion::returning(json!({
            "explanations": [
                {"section": "SELECT DATE_TRUNC('day', c.created_at) as date", "explanation": "Buckets credits by day."},
                {"section": "FROM public.credits c", "explanation": "Reads the credits table."},
                {"section": "GROUP BY 1", "explanation": "One row per day."}
            ]
        })));
        let generator = ExplanationGenerator::new(fake.clone(), "gpt-4o".to_string());
        let explanation = generator
            .explain_query("credits per day", "SELECT ... LIMIT 100;")
            .await
            .unwrap();

        let sections: Vec<&str> = explanation.explanations.iter().map(|e| e.section.as_str()).collect();
        assert_eq!(sections[1], "FROM public.credits c");
        assert_eq!(explanation.explanations.len(), 3);

        let request = fake.last_request().unwrap();
        assert_eq!(request.model, "gpt-4o");
        assert!(request.prompt.contains("User Query: credits per day"));
        assert!(request.prompt.contains("SQL Query: SELECT ... LIMIT 100;"));
    }

    #[tokio::test]
    async fn test_failure_wrapped() {
        let fake = Arc::new(FakeCompletion::failing("timeout"));
        let err = ExplanationGenerator::new(fake, "gpt-4o".to_string())
            .explain_query("q", "SELECT 1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate explanation: LLM error: timeout");
    }
}
