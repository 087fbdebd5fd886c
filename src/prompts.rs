//! Prompts - System and task prompts for the completion-backed stages
//!
//! Query generation, explanation and chart recommendation each get a system
//! prompt (role, domain knowledge, rules) and a task prompt (the user's
//! request plus per-request data).

use crate::catalog::SchemaCatalog;
use crate::execution::ResultRow;

/// Worked analytical patterns used as few-shot guidance for query generation
pub const QUERY_PATTERNS: &str = r#"1. User Activity Analysis:
  SELECT p.email, COUNT(m.id) as total_models,
    COUNT(CASE WHEN m.status = 'finished' THEN 1 END) as completed_models,
    COALESCE(SUM(c.credits), 0) as total_credits
  FROM public.profiles p
  LEFT JOIN public.models m ON p.id = m.user_id
  LEFT JOIN public.credits c ON p.id = c.user_id
  GROUP BY p.id, p.email
  ORDER BY total_models DESC LIMIT 10;

2. Model Performance:
  SELECT m.type,
    AVG(EXTRACT(EPOCH FROM (
      CASE WHEN m.status = 'finished'
      THEN m.created_at - m.created_at END
    ))/3600)::numeric(10,2) as avg_hours_to_complete,
    COUNT(*) as total_models,
    COUNT(CASE WHEN m.status = 'finished' THEN 1 END) as successful_models
  FROM public.models m
  GROUP BY m.type;

3. Credit Analysis:
  SELECT DATE_TRUNC('day', c.created_at) as date,
    COUNT(DISTINCT c.user_id) as unique_users,
    SUM(c.credits) as daily_credits
  FROM public.credits c
  GROUP BY DATE_TRUNC('day', c.created_at)
  ORDER BY date DESC;

4. Email Search:
  SELECT p.email, STRING_AGG(m."modelId"::text, ', ') as model_ids,
    COALESCE(SUM(c.credits), 0) as total_credits,
    COUNT(CASE WHEN m.status = 'finished' THEN 1 END) as finished_models
  FROM public.profiles p
  LEFT JOIN public.models m ON p.id = m.user_id
  LEFT JOIN public.credits c ON p.id = c.user_id
  WHERE LOWER(p.email) LIKE LOWER('%search_term%')
  GROUP BY p.id, p.email;"#;

pub const QUERY_FORMATTING_RULES: &str =
    "Always include proper JOINs (LEFT JOIN where rows may be missing), handle NULLs with COALESCE, and use meaningful column aliases.";

pub const QUERY_REQUIREMENTS: &str = r#"Requirements:
1. Join profiles with models and credits
2. Handle case-insensitive email search
3. Group results by user
4. Show all model IDs as comma-separated list"#;

pub fn query_system_prompt(catalog: &SchemaCatalog) -> String {
    format!(
        "You are a SQL analyst for an AI model training platform.\n\n\
         Available tables:\n{}\n\
         Common analysis patterns:\n\n{}\n\n{}\n\
         Only write a single read-only SELECT statement.",
        catalog.render(),
        QUERY_PATTERNS,
        QUERY_FORMATTING_RULES
    )
}

pub fn query_task_prompt(input: &str) -> String {
    format!("Write a PostgreSQL query to: {}\n\n{}", input, QUERY_REQUIREMENTS)
}

pub const EXPLAIN_SYSTEM_PROMPT: &str = r#"You are a SQL (postgres) expert. Explain queries for these tables:

- credits: Stores user credit information
- models: Stores AI model metadata
- images: Stores generated images
- samples: Stores training samples

Key aspects to explain:
1. Table joins and relationships
2. Time-based operations
3. Aggregations
4. Filtering conditions
5. Group by / Having clauses

Break the query into sections in the order they appear and explain each one."#;

pub fn explain_task_prompt(input: &str, sql: &str) -> String {
    format!(
        "Explain this query in simple terms:\n\nUser Query: {}\nSQL Query: {}",
        input, sql
    )
}

pub const CHART_SYSTEM_PROMPT: &str = r#"You are a data visualization expert. Recommend charts based on:
- Time series: line charts for credit usage over time
- Distributions: histograms or box plots for credit balances
- User comparisons: bar charts for credit usage by user
- Aggregations: pie charts for credit distribution

xKey and every entry of yKeys must be column names present in the data."#;

pub fn chart_task_prompt(input: &str, rows: &[ResultRow]) -> String {
    let data = serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
    format!("Suggest visualization for:\nQuery: {}\nData: {}", input, data)
}
