//! Chart Config Generator - Chart recommendation for a result set
//!
//! The model picks the chart type and the axis keys. Colors are never asked
//! of the model: the i-th y key gets palette token `chart-color-{i+1}`.

use crate::error::{LucyError, Result};
use crate::execution::ResultRow;
use crate::llm::{self, CompletionRequest, CompletionService, OutputSchema};
use crate::prompts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Area,
    Pie,
    Scatter,
}

/// Chart shape produced by the model (no colors)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub takeaway: String,
    pub x_key: String,
    pub y_keys: Vec<String>,
    #[serde(default)]
    pub legend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_lines: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(flatten)]
    pub spec: ChartSpec,
    pub colors: BTreeMap<String, String>,
}

/// Palette token for the series at `index` (0-based)
pub fn palette_color(index: usize) -> String {
    format!("chart-color-{}", index + 1)
}

/// Assign palette tokens to `y_keys` in order. A repeated key keeps the
/// token of its last position.
pub fn assign_colors(y_keys: &[String]) -> BTreeMap<String, String> {
    y_keys
        .iter()
        .enumerate()
        .map(|(idx, key)| (key.clone(), palette_color(idx)))
        .collect()
}

impl ChartSpec {
    pub fn with_palette(self) -> ChartConfig {
        let colors = assign_colors(&self.y_keys);
        ChartConfig { spec: self, colors }
    }
}

impl ChartConfig {
    /// Axis keys that do not appear as a column in any of `rows`
    pub fn missing_keys(&self, rows: &[ResultRow]) -> Vec<String> {
        std::iter::once(&self.spec.x_key)
            .chain(self.spec.y_keys.iter())
            .filter(|key| !rows.iter().any(|row| row.contains_key(key.as_str())))
            .cloned()
            .collect()
    }
}

pub fn chart_schema() -> OutputSchema {
    let nullable = |ty: serde_json::Value| serde_json::json!({ "type": [ty, "null"] });
    OutputSchema::new(
        "chart_config",
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "enum": ["bar", "line", "area", "pie", "scatter"] },
                "title": { "type": "string" },
                "description": { "type": "string", "description": "What the chart shows and what is interesting about it" },
                "takeaway": { "type": "string", "description": "Main takeaway from the chart" },
                "xKey": { "type": "string", "description": "Key for x-axis or category" },
                "yKeys": { "type": "array", "items": { "type": "string" }, "description": "Key(s) for y-axis values" },
                "legend": { "type": "boolean" },
                "multipleLines": nullable("boolean".into()),
                "measurementColumn": nullable("string".into()),
                "lineCategories": {
                    "type": ["array", "null"],
                    "items": { "type": "string" }
                }
            },
            "required": [
                "type", "title", "description", "takeaway", "xKey", "yKeys", "legend",
                "multipleLines", "measurementColumn", "lineCategories"
            ],
            "additionalProperties": false
        }),
    )
}

pub struct ChartConfigGenerator {
    llm: Arc<dyn CompletionService>,
    model: String,
}

impl ChartConfigGenerator {
    pub fn new(llm: Arc<dyn CompletionService>, model: String) -> Self {
        Self { llm, model }
    }

    pub async fn generate_chart_config(&self, rows: &[ResultRow], input: &str) -> Result<ChartConfig> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: prompts::CHART_SYSTEM_PROMPT.to_string(),
            prompt: prompts::chart_task_prompt(input, rows),
            schema: chart_schema(),
        };

        let spec: ChartSpec = llm::generate(self.llm.as_ref(), &request).await.map_err(|e| {
            error!("Chart configuration error: {}", e);
            LucyError::ChartConfig(e.to_string())
        })?;

        let config = spec.with_palette();
        let missing = config.missing_keys(rows);
        if !rows.is_empty() && !missing.is_empty() {
            warn!("Chart keys not present in result rows: {:?}", missing);
        }
        Ok(config)
    }
}
