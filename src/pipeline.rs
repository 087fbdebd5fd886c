//! Analytics Pipeline - Wires the stages around shared client handles
//!
//! generate -> execute -> (explain) -> (chart). Each stage is also callable on
//! its own; nothing is carried between calls.

use crate::catalog::SchemaCatalog;
use crate::chart::{ChartConfig, ChartConfigGenerator};
use crate::config::LucyConfig;
use crate::dashboard::{DashboardService, DashboardStats};
use crate::db::{DatabaseEndpoint, SupabaseClient};
use crate::diagnostics::{ConnectivityDiagnostic, DiagnosticReport};
use crate::error::Result;
use crate::execution::{QueryExecutor, ResultRow, ResultSet};
use crate::explain::{Explanation, ExplanationGenerator};
use crate::llm::{CompletionService, LlmClient};
use crate::query_generator::{GeneratedQuery, QueryGenerator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskOptions {
    #[serde(default)]
    pub explain: bool,
    #[serde(default)]
    pub chart: bool,
}

/// Everything produced for one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub query: GeneratedQuery,
    pub rows: ResultSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartConfig>,
}

pub struct AnalyticsPipeline {
    catalog: Arc<SchemaCatalog>,
    generator: QueryGenerator,
    executor: QueryExecutor,
    explainer: ExplanationGenerator,
    charts: ChartConfigGenerator,
    diagnostic: ConnectivityDiagnostic,
    dashboard: DashboardService,
}

impl AnalyticsPipeline {
    /// Build the pipeline around injected clients.
    pub fn new(
        config: &LucyConfig,
        llm: Arc<dyn CompletionService>,
        db: Arc<dyn DatabaseEndpoint>,
        catalog: Arc<SchemaCatalog>,
    ) -> Self {
        Self {
            generator: QueryGenerator::new(llm.clone(), catalog.clone(), config.llm.query_model.clone())
                .with_row_limit(config.row_limit)
                .with_policy(config.catalog_policy),
            executor: QueryExecutor::new(db.clone()),
            explainer: ExplanationGenerator::new(llm.clone(), config.llm.explain_model.clone()),
            charts: ChartConfigGenerator::new(llm, config.llm.chart_model.clone()),
            diagnostic: ConnectivityDiagnostic::new(db.clone()),
            dashboard: DashboardService::new(db),
            catalog,
        }
    }

    /// Build the pipeline with the HTTP clients described by `config`.
    pub fn from_config(config: &LucyConfig) -> Result<Self> {
        let llm = Arc::new(LlmClient::from_config(&config.llm, config.http_timeout)?);
        let db = Arc::new(SupabaseClient::new(&config.supabase, config.http_timeout)?);
        Ok(Self::new(config, llm, db, Arc::new(SchemaCatalog::platform())))
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub async fn generate_query(&self, input: &str) -> Result<GeneratedQuery> {
        self.generator.generate_query(input).await
    }

    pub async fn execute_query(&self, sql: &str) -> Result<ResultSet> {
        self.executor.execute_query(sql).await
    }

    pub async fn explain_query(&self, input: &str, sql: &str) -> Result<Explanation> {
        self.explainer.explain_query(input, sql).await
    }

    pub async fn generate_chart_config(&self, rows: &[ResultRow], input: &str) -> Result<ChartConfig> {
        self.charts.generate_chart_config(rows, input).await
    }

    pub async fn test_database_connection(&self) -> DiagnosticReport {
        self.diagnostic.test_database_connection().await
    }

    pub async fn dashboard_stats(&self) -> Option<DashboardStats> {
        self.dashboard.dashboard_stats().await
    }

    /// Run one question through the stages selected by `options`.
    ///
    /// The chart stage is skipped when the query returned no rows.
    pub async fn ask(&self, input: &str, options: AskOptions) -> Result<AnalysisOutcome> {
        let query = self.generate_query(input).await?;
        let rows = self.execute_query(&query.sql).await?;

        let explanation = if options.explain {
            Some(self.explain_query(input, &query.sql).await?)
        } else {
            None
        };

        let chart = if options.chart && !rows.is_empty() {
            Some(self.generate_chart_config(&rows, input).await?)
        } else {
            None
        };

        info!(
            "Answered question with {} rows (explanation: {}, chart: {})",
            rows.len(),
            explanation.is_some(),
            chart.is_some()
        );
        Ok(AnalysisOutcome {
            query,
            rows,
            explanation,
            chart,
        })
    }
}
