use crate::config::LlmConfig;
use crate::error::{LucyError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Name and JSON schema of the object a completion must produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: &str, schema: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

/// One structured completion: model, system instruction, user prompt, output schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub schema: OutputSchema,
}

/// Completion service that returns a JSON object matching the requested schema.
///
/// Implementations must not retry; the caller wraps any failure into its own
/// stage error.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn generate_object(&self, request: &CompletionRequest) -> Result<serde_json::Value>;
}

/// Run a completion and coerce the result into `T`.
pub async fn generate<T: DeserializeOwned>(
    service: &dyn CompletionService,
    request: &CompletionRequest,
) -> Result<T> {
    let value = service.generate_object(request).await?;
    serde_json::from_value(value).map_err(|e| {
        LucyError::Llm(format!(
            "Response did not match schema '{}': {}",
            request.schema.name, e
        ))
    })
}

/// How a model is asked to produce the output object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// `response_format: json_schema` in strict mode
    StructuredOutputs,
    /// `response_format: json_object` with the schema appended to the system message
    JsonMode,
    /// The schema is the parameter list of a forced function call
    ToolCall,
    /// No system role and no response format; everything goes in the user message
    PromptOnly,
}

const STRUCTURED_OUTPUT_PREFIXES: &[&str] = &["gpt-4o", "gpt-4.1", "gpt-5", "o1", "o3", "o4"];
const JSON_MODE_PREFIXES: &[&str] = &["gpt-4-turbo", "gpt-4-1106", "gpt-4-0125", "gpt-3.5-turbo"];
const REASONING_PREFIXES: &[&str] = &["gpt-5", "o1", "o3", "o4"];

impl OutputMode {
    pub fn for_model(model: &str) -> Self {
        let model = model.trim().to_lowercase();
        let has_prefix = |prefixes: &[&str]| prefixes.iter().any(|p| model.starts_with(p));

        if model.starts_with("o1-mini") || model.starts_with("o1-preview") {
            OutputMode::PromptOnly
        } else if model == "gpt-4o-2024-05-13" {
            // First gpt-4o snapshot: JSON mode only
            OutputMode::JsonMode
        } else if has_prefix(STRUCTURED_OUTPUT_PREFIXES) {
            OutputMode::StructuredOutputs
        } else if has_prefix(JSON_MODE_PREFIXES) && !model.contains("0301") && !model.contains("0613") {
            OutputMode::JsonMode
        } else {
            OutputMode::ToolCall
        }
    }
}

/// Reasoning models only accept the default temperature
fn accepts_temperature(model: &str) -> bool {
    let model = model.trim().to_lowercase();
    !REASONING_PREFIXES.iter().any(|p| model.starts_with(p))
}

/// Client for OpenAI-compatible `/chat/completions` endpoints
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LucyError::Llm(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        Self::new(config.api_key.clone(), config.base_url.clone(), timeout)
    }

    fn system_with_schema(request: &CompletionRequest) -> String {
        format!(
            "{}\n\nRespond with a single JSON object that conforms to this JSON schema:\n{}",
            request.system,
            serde_json::to_string_pretty(&request.schema.schema).unwrap_or_default()
        )
    }

    fn build_body(request: &CompletionRequest) -> serde_json::Value {
        let messages = |system: String| {
            serde_json::json!([
                {"role": "system", "content": system},
                {"role": "user", "content": request.prompt}
            ])
        };

        let mut body = match OutputMode::for_model(&request.model) {
            OutputMode::StructuredOutputs => serde_json::json!({
                "model": request.model,
                "messages": messages(request.system.clone()),
                "response_format": {
                    "type": "json_schema",
                    "json_schema": {
                        "name": request.schema.name,
                        "strict": true,
                        "schema": request.schema.schema,
                    }
                },
            }),
            OutputMode::JsonMode => serde_json::json!({
                "model": request.model,
                "messages": messages(Self::system_with_schema(request)),
                "response_format": { "type": "json_object" },
            }),
            OutputMode::ToolCall => serde_json::json!({
                "model": request.model,
                "messages": messages(request.system.clone()),
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": request.schema.name,
                        "description": "Return the result as the arguments of this function",
                        "parameters": request.schema.schema,
                    }
                }],
                "tool_choice": { "type": "function", "function": { "name": request.schema.name } },
            }),
            OutputMode::PromptOnly => serde_json::json!({
                "model": request.model,
                "messages": [{
                    "role": "user",
                    "content": format!("{}\n\n{}", Self::system_with_schema(request), request.prompt)
                }],
            }),
        };

        if accepts_temperature(&request.model) {
            body["temperature"] = serde_json::json!(0.1);
        }
        body
    }
}

/// Strip markdown fences some models wrap around JSON output
pub fn clean_json_response(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn generate_object(&self, request: &CompletionRequest) -> Result<serde_json::Value> {
        let body = Self::build_body(request);
        debug!("Calling completion model {} for schema {}", request.model, request.schema.name);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LucyError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LucyError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LucyError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = extract_output(&response_json)?;
        serde_json::from_str(clean_json_response(&content))
            .map_err(|e| LucyError::Llm(format!("Model output is not valid JSON: {}. Output: {}", e, content)))
    }
}

/// Pull the output object text out of a chat completion body: the first
/// tool call's arguments when present, otherwise the message content
fn extract_output(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(LucyError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| LucyError::Llm("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(LucyError::Llm("LLM response was filtered by content policy".to_string()))
        }
        _ => {}
    }

    if let Some(refusal) = choice["message"]["refusal"].as_str() {
        return Err(LucyError::Llm(format!("Model refused the request: {}", refusal)));
    }

    if let Some(arguments) = choice["message"]["tool_calls"][0]["function"]["arguments"].as_str() {
        return Ok(arguments.to_string());
    }

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| LucyError::Llm("No content in LLM response".to_string()))?;
    if content.trim().is_empty() {
        return Err(LucyError::Llm("Empty content in LLM response".to_string()));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            system: "You are a SQL analyst.".to_string(),
            prompt: "count users".to_string(),
            schema: OutputSchema::new(
                "sql_query",
                json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"], "additionalProperties": false}),
            ),
        }
    }

    #[test]
    fn test_structured_outputs_body() {
        let body = LlmClient::build_body(&request("gpt-4o"));
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "sql_query");
        assert_eq!(body["messages"][0]["content"], "You are a SQL analyst.");
        assert_eq!(body["messages"][1]["content"], "count users");
    }

    #[test]
    fn test_json_mode_body_embeds_schema() {
        let body = LlmClient::build_body(&request("gpt-4-turbo"));
        assert_eq!(body["response_format"]["type"], "json_object");
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.starts_with("You are a SQL analyst."));
        assert!(system.contains("\"query\""));
    }

    #[test]
    fn test_plain_gpt4_uses_forced_tool_call() {
        let body = LlmClient::build_body(&request(crate::config::DEFAULT_QUERY_MODEL));
        assert!(body.get("response_format").is_none());
        assert_eq!(body["tools"][0]["function"]["name"], "sql_query");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["query"]));
        assert_eq!(body["tool_choice"]["function"]["name"], "sql_query");
        assert_eq!(body["messages"][0]["content"], "You are a SQL analyst.");
        assert_eq!(body["temperature"], 0.1);
    }

    #[test]
    fn test_output_mode_table() {
        assert_eq!(OutputMode::for_model("gpt-4o-mini"), OutputMode::StructuredOutputs);
        assert_eq!(OutputMode::for_model("gpt-4o-2024-08-06"), OutputMode::StructuredOutputs);
        assert_eq!(OutputMode::for_model("gpt-4o-2024-05-13"), OutputMode::JsonMode);
        assert_eq!(OutputMode::for_model("o3-mini"), OutputMode::StructuredOutputs);
        assert_eq!(OutputMode::for_model("o1-mini"), OutputMode::PromptOnly);
        assert_eq!(OutputMode::for_model("o1-preview"), OutputMode::PromptOnly);
        assert_eq!(OutputMode::for_model("gpt-3.5-turbo-0125"), OutputMode::JsonMode);
        assert_eq!(OutputMode::for_model("gpt-3.5-turbo-0613"), OutputMode::ToolCall);
        assert_eq!(OutputMode::for_model("gpt-4-0613"), OutputMode::ToolCall);
        assert_eq!(OutputMode::for_model("llama-3-70b"), OutputMode::ToolCall);
    }

    #[test]
    fn test_prompt_only_body_has_no_system_role() {
        let body = LlmClient::build_body(&request("o1-mini"));
        assert!(body.get("response_format").is_none());
        assert!(body.get("temperature").is_none());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        let content = messages[0]["content"].as_str().unwrap();
        assert!(content.starts_with("You are a SQL analyst."));
        assert!(content.ends_with("count users"));
    }

    #[test]
    fn test_reasoning_models_skip_temperature() {
        assert!(LlmClient::build_body(&request("o3")).get("temperature").is_none());
        assert!(LlmClient::build_body(&request("gpt-5-mini")).get("temperature").is_none());
        assert_eq!(LlmClient::build_body(&request("gpt-4.1"))["temperature"], 0.1);
    }

    #[test]
    fn test_clean_json_response() {
        assert_eq!(clean_json_response("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(clean_json_response("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_extract_output() {
        let body = json!({"choices": [{"finish_reason": "stop", "message": {"content": "{\"query\":\"SELECT 1\"}"}}]});
        assert_eq!(extract_output(&body).unwrap(), "{\"query\":\"SELECT 1\"}");

        let filtered = json!({"choices": [{"finish_reason": "content_filter", "message": {"content": "x"}}]});
        assert!(extract_output(&filtered).is_err());

        let api_error = json!({"error": {"message": "bad key"}});
        assert!(extract_output(&api_error).unwrap_err().to_string().contains("bad key"));

        assert!(extract_output(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_extract_output_reads_tool_call_arguments() {
        let body = json!({"choices": [{
            "finish_reason": "stop",
            "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "sql_query", "arguments": "{\"query\":\"SELECT 1\"}"}
                }]
            }
        }]});
        assert_eq!(extract_output(&body).unwrap(), "{\"query\":\"SELECT 1\"}");
    }
}
