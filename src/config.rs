//! Configuration - Environment-driven settings for the analytics core
//!
//! Values are read from the process environment (a `.env` file is loaded by the
//! binaries through `dotenv`). Supabase and OpenAI credentials are required;
//! everything else has a default.

use crate::error::{LucyError, Result};
use crate::sql_guard::CatalogPolicy;
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_QUERY_MODEL: &str = "gpt-4";
pub const DEFAULT_EXPLAIN_MODEL: &str = "gpt-4o";
pub const DEFAULT_CHART_MODEL: &str = "gpt-4";
pub const DEFAULT_ROW_LIMIT: u32 = 100;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Connection settings for the hosted Postgres backend.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

/// Completion model settings, one model per pipeline stage.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub query_model: String,
    pub explain_model: String,
    pub chart_model: String,
}

#[derive(Debug, Clone)]
pub struct LucyConfig {
    pub supabase: SupabaseConfig,
    pub llm: LlmConfig,
    pub row_limit: u32,
    pub catalog_policy: CatalogPolicy,
    pub http_timeout: Duration,
    pub bind_addr: String,
}

impl LucyConfig {
    /// Build configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get("SUPABASE_URL").or_else(|| get("NEXT_PUBLIC_SUPABASE_URL"));
        let key = get("SUPABASE_SERVICE_ROLE_KEY");
        let (url, service_role_key) = match (url, key) {
            (Some(url), Some(key)) => (url, key),
            _ => return Err(LucyError::Config("Missing Supabase credentials".to_string())),
        };

        let api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| LucyError::Config("Missing OPENAI_API_KEY".to_string()))?;

        let row_limit = match get("LUCY_ROW_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| LucyError::Config(format!("Invalid LUCY_ROW_LIMIT: {}", raw)))?,
            None => DEFAULT_ROW_LIMIT,
        };

        let catalog_policy = match get("LUCY_CATALOG_POLICY") {
            Some(raw) => raw.parse::<CatalogPolicy>()?,
            None => CatalogPolicy::default(),
        };

        let http_timeout = match get("LUCY_HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    LucyError::Config(format!("Invalid LUCY_HTTP_TIMEOUT_SECS: {}", raw))
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(60),
        };

        Ok(Self {
            supabase: SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
            },
            llm: LlmConfig {
                api_key,
                base_url: get("OPENAI_BASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                query_model: get("LUCY_QUERY_MODEL").unwrap_or_else(|| DEFAULT_QUERY_MODEL.to_string()),
                explain_model: get("LUCY_EXPLAIN_MODEL").unwrap_or_else(|| DEFAULT_EXPLAIN_MODEL.to_string()),
                chart_model: get("LUCY_CHART_MODEL").unwrap_or_else(|| DEFAULT_CHART_MODEL.to_string()),
            },
            row_limit,
            catalog_policy,
            http_timeout,
            bind_addr: get("LUCY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("SUPABASE_URL", "https://project.supabase.co/"),
        ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn test_defaults_applied() {
        let config = LucyConfig::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.supabase.url, "https://project.supabase.co");
        assert_eq!(config.llm.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.llm.query_model, "gpt-4");
        assert_eq!(config.llm.explain_model, "gpt-4o");
        assert_eq!(config.row_limit, 100);
        assert_eq!(config.catalog_policy, CatalogPolicy::Warn);
        assert_eq!(config.http_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_supabase_credentials() {
        let err = LucyConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: Missing Supabase credentials");
    }

    #[test]
    fn test_public_url_fallback() {
        let config = LucyConfig::from_lookup(lookup(&[
            ("NEXT_PUBLIC_SUPABASE_URL", "https://public.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(config.supabase.url, "https://public.supabase.co");
    }

    #[test]
    fn test_invalid_row_limit_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("LUCY_ROW_LIMIT", "0"));
        assert!(LucyConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_policy_override() {
        let mut pairs = BASE.to_vec();
        pairs.push(("LUCY_CATALOG_POLICY", "enforce"));
        let config = LucyConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.catalog_policy, CatalogPolicy::Enforce);
    }
}
