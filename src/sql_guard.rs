//! SQL Guards - Deterministic checks applied to model-generated SQL
//!
//! Two layers run after generation:
//! - post-processing that forces a row cap and a SELECT-only statement
//! - a catalog check that parses the SQL and compares every referenced
//!   table against the schema catalog
//!
//! The catalog check is governed by [`CatalogPolicy`].

use crate::catalog::SchemaCatalog;
use crate::error::{LucyError, Result};
use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, ObjectName, Query, SetExpr, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::str::FromStr;
use tracing::warn;

pub const SELECT_REQUIRED: &str = "Generated query must start with SELECT";

/// How catalog violations are handled after generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogPolicy {
    /// Skip parsing entirely
    Off,
    /// Log violations and continue
    #[default]
    Warn,
    /// Reject the query on any violation
    Enforce,
}

impl FromStr for CatalogPolicy {
    type Err = LucyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(CatalogPolicy::Off),
            "warn" => Ok(CatalogPolicy::Warn),
            "enforce" => Ok(CatalogPolicy::Enforce),
            other => Err(LucyError::Config(format!(
                "Unknown catalog policy '{}' (expected off, warn or enforce)",
                other
            ))),
        }
    }
}

/// Append `LIMIT {limit};` when the statement has no limit clause.
///
/// The check is a substring test on the lowercased text, so any occurrence of
/// `limit` (even inside an identifier) counts as present.
pub fn ensure_row_limit(sql: &str, limit: u32) -> String {
    let trimmed = sql.trim();
    if trimmed.to_lowercase().contains("limit") {
        return trimmed.to_string();
    }
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    format!("{} LIMIT {};", body, limit)
}

pub fn ensure_select(sql: &str) -> Result<()> {
    if sql.trim().to_lowercase().starts_with("select") {
        Ok(())
    } else {
        Err(LucyError::Generation(SELECT_REQUIRED.to_string()))
    }
}

/// Result of parsing a statement and comparing it to the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCheck {
    pub parsed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    pub statement_count: usize,
    /// True when the input is exactly one query statement
    pub read_only: bool,
    pub has_limit: bool,
    pub tables: Vec<String>,
    pub unknown_tables: Vec<String>,
}

impl CatalogCheck {
    pub fn is_clean(&self) -> bool {
        self.parsed && self.read_only && self.unknown_tables.is_empty()
    }

    /// Parse `sql` and collect every table it reads from.
    pub fn run(sql: &str, catalog: &SchemaCatalog) -> Self {
        let dialect = PostgreSqlDialect {};
        let statements = match Parser::parse_sql(&dialect, sql) {
            Ok(statements) => statements,
            Err(e) => {
                return Self {
                    parse_error: Some(e.to_string()),
                    ..Self::default()
                };
            }
        };

        let mut collector = TableCollector::default();
        let mut read_only = statements.len() == 1;
        let mut has_limit = false;
        for stmt in &statements {
            match stmt {
                Statement::Query(query) => has_limit |= query.limit.is_some(),
                _ => read_only = false,
            }
            let _ = stmt.visit(&mut collector);
        }

        let TableCollector {
            tables,
            ctes,
            table_functions,
        } = collector;
        let tables: Vec<String> = tables
            .into_iter()
            .filter(|t| !table_functions.contains(t))
            .collect();
        let unknown_tables = tables
            .iter()
            .filter(|t| !ctes.contains(&t.to_lowercase()) && !catalog.contains_table(t))
            .cloned()
            .collect();

        Self {
            parsed: true,
            parse_error: None,
            statement_count: statements.len(),
            read_only,
            has_limit,
            tables,
            unknown_tables,
        }
    }

    /// Apply `policy` to this check. Only `Enforce` can fail.
    pub fn apply(&self, policy: CatalogPolicy) -> Result<()> {
        match policy {
            CatalogPolicy::Off => Ok(()),
            CatalogPolicy::Warn => {
                if let Some(err) = &self.parse_error {
                    warn!("Generated query could not be parsed for catalog check: {}", err);
                } else if !self.read_only {
                    warn!("Generated SQL is not a single read-only query ({} statements)", self.statement_count);
                }
                if !self.unknown_tables.is_empty() {
                    warn!("Generated query references tables outside the catalog: {:?}", self.unknown_tables);
                }
                Ok(())
            }
            CatalogPolicy::Enforce => {
                if let Some(err) = &self.parse_error {
                    return Err(LucyError::Generation(format!("Generated query could not be parsed: {}", err)));
                }
                if !self.read_only {
                    return Err(LucyError::Generation(
                        "Generated SQL must be a single read-only query".to_string(),
                    ));
                }
                if !self.unknown_tables.is_empty() {
                    return Err(LucyError::Generation(format!(
                        "Generated query references unknown tables: {}",
                        self.unknown_tables.join(", ")
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Collects every relation in a statement plus the CTE names defined
/// anywhere in it
#[derive(Default)]
struct TableCollector {
    tables: BTreeSet<String>,
    ctes: BTreeSet<String>,
    /// Set-returning functions in FROM, e.g. `generate_series(...)`
    table_functions: BTreeSet<String>,
}

fn qualified_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

impl TableCollector {
    fn record_ctes(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
                self.record_ctes(&cte.query);
            }
        }
        self.record_set_expr_ctes(&query.body);
    }

    fn record_set_expr_ctes(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Query(query) => self.record_ctes(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.record_set_expr_ctes(left);
                self.record_set_expr_ctes(right);
            }
            _ => {}
        }
    }
}

impl Visitor for TableCollector {
    type Break = ();

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<()> {
        if let Statement::Query(query) = statement {
            self.record_ctes(query);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<()> {
        match factor {
            TableFactor::Derived { subquery, .. } => self.record_ctes(subquery),
            TableFactor::Table { name, args: Some(_), .. } => {
                self.table_functions.insert(qualified_name(name));
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        match expr {
            Expr::Subquery(query)
            | Expr::ArraySubquery(query)
            | Expr::Exists { subquery: query, .. }
            | Expr::InSubquery { subquery: query, .. } => self.record_ctes(query),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        self.tables.insert(qualified_name(relation));
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_appended_when_missing() {
        assert_eq!(
            ensure_row_limit("SELECT email FROM profiles", 100),
            "SELECT email FROM profiles LIMIT 100;"
        );
        assert_eq!(
            ensure_row_limit("  SELECT email FROM profiles;  \n", 100),
            "SELECT email FROM profiles LIMIT 100;"
        );
    }

    #[test]
    fn test_existing_limit_kept() {
        let sql = "SELECT email FROM profiles LIMIT 5;";
        assert_eq!(ensure_row_limit(sql, 100), sql);
        assert_eq!(ensure_row_limit("select 1 limit 3", 100), "select 1 limit 3");
    }

    #[test]
    fn test_custom_limit() {
        assert_eq!(ensure_row_limit("SELECT 1", 25), "SELECT 1 LIMIT 25;");
    }

    #[test]
    fn test_select_required() {
        assert!(ensure_select("select * from credits").is_ok());
        assert!(ensure_select("  SELECT 1").is_ok());
        let err = ensure_select("UPDATE credits SET credits = 0").unwrap_err();
        assert!(matches!(err, LucyError::Generation(ref m) if m == SELECT_REQUIRED));
        assert!(ensure_select("WITH x AS (SELECT 1) SELECT * FROM x").is_err());
    }

    #[test]
    fn test_catalog_check_collects_joined_tables() {
        let sql = "SELECT p.email, COALESCE(SUM(c.credits), 0) AS total_credits \
                   FROM public.profiles p \
                   LEFT JOIN public.models m ON p.id = m.user_id \
                   LEFT JOIN public.credits c ON p.id = c.user_id \
                   GROUP BY p.id, p.email LIMIT 10;";
        let check = CatalogCheck::run(sql, &SchemaCatalog::platform());
        assert!(check.parsed);
        assert!(check.read_only);
        assert!(check.has_limit);
        assert_eq!(check.tables, vec!["public.credits", "public.models", "public.profiles"]);
        assert!(check.unknown_tables.is_empty());
        assert!(check.is_clean());
    }

    #[test]
    fn test_catalog_check_flags_unknown_tables() {
        let sql = "SELECT u.email FROM auth.users u WHERE u.id IN (SELECT user_id FROM payments) LIMIT 5;";
        let check = CatalogCheck::run(sql, &SchemaCatalog::platform());
        assert_eq!(check.unknown_tables, vec!["auth.users", "payments"]);
        assert!(!check.is_clean());
        assert!(check.apply(CatalogPolicy::Warn).is_ok());
        let err = check.apply(CatalogPolicy::Enforce).unwrap_err();
        assert!(err.to_string().contains("auth.users, payments"));
    }

    #[test]
    fn test_catalog_check_knows_ctes() {
        let sql = "WITH daily AS (SELECT DATE_TRUNC('day', created_at) AS date, SUM(credits) AS daily_credits \
                   FROM credits GROUP BY 1) SELECT * FROM daily LIMIT 100;";
        let check = CatalogCheck::run(sql, &SchemaCatalog::platform());
        assert!(check.unknown_tables.is_empty(), "{:?}", check.unknown_tables);
        assert!(check.tables.contains(&"credits".to_string()));
    }

    fn assert_rejects_hidden_table(sql: &str, hidden: &str) {
        let check = CatalogCheck::run(sql, &SchemaCatalog::platform());
        assert!(check.parsed, "{:?}", check.parse_error);
        assert_eq!(check.unknown_tables, vec![hidden.to_string()], "{}", sql);
        assert!(check.apply(CatalogPolicy::Enforce).is_err());
    }

    #[test]
    fn test_catalog_check_sees_subquery_in_function_argument() {
        assert_rejects_hidden_table(
            "SELECT COALESCE((SELECT email FROM auth.users LIMIT 1), 'x') AS email FROM profiles LIMIT 1;",
            "auth.users",
        );
    }

    #[test]
    fn test_catalog_check_sees_subquery_in_case() {
        assert_rejects_hidden_table(
            "SELECT CASE WHEN EXISTS (SELECT 1 FROM auth.users) THEN 1 ELSE 0 END AS flag FROM profiles LIMIT 1;",
            "auth.users",
        );
    }

    #[test]
    fn test_catalog_check_sees_subquery_in_join_constraint() {
        assert_rejects_hidden_table(
            "SELECT p.email FROM profiles p JOIN credits c ON c.user_id IN (SELECT id FROM auth.users) LIMIT 10;",
            "auth.users",
        );
    }

    #[test]
    fn test_catalog_check_sees_subquery_in_order_by() {
        assert_rejects_hidden_table(
            "SELECT email FROM profiles ORDER BY (SELECT max(x) FROM secrets) LIMIT 10;",
            "secrets",
        );
    }

    #[test]
    fn test_catalog_check_sees_group_by_and_lateral() {
        assert_rejects_hidden_table(
            "SELECT p.email FROM profiles p GROUP BY p.email, (SELECT 1 FROM payments LIMIT 1) LIMIT 10;",
            "payments",
        );
        assert_rejects_hidden_table(
            "SELECT p.email, l.n FROM profiles p, LATERAL (SELECT count(*) AS n FROM payments WHERE payments.user_id = p.id) l LIMIT 10;",
            "payments",
        );
    }

    #[test]
    fn test_catalog_check_ignores_table_functions() {
        let sql = "SELECT d.dt, COUNT(c.id) AS credits_used \
                   FROM generate_series(now() - interval '7 days', now(), interval '1 day') AS d(dt) \
                   LEFT JOIN credits c ON DATE_TRUNC('day', c.created_at) = d.dt \
                   GROUP BY d.dt LIMIT 100;";
        let check = CatalogCheck::run(sql, &SchemaCatalog::platform());
        assert!(check.parsed, "{:?}", check.parse_error);
        assert_eq!(check.tables, vec!["credits"]);
        assert!(check.is_clean());
    }

    #[test]
    fn test_catalog_check_serializes_camel_case() {
        let check = CatalogCheck::run("SELECT * FROM payments", &SchemaCatalog::platform());
        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["unknownTables"], serde_json::json!(["payments"]));
        assert_eq!(value["statementCount"], 1);
        assert_eq!(value["readOnly"], true);
        assert!(value.get("unknown_tables").is_none());
    }

    #[test]
    fn test_catalog_check_rejects_multiple_statements() {
        let check = CatalogCheck::run("SELECT 1; DELETE FROM credits;", &SchemaCatalog::platform());
        assert!(check.parsed);
        assert!(!check.read_only);
        assert_eq!(check.statement_count, 2);
        assert!(check.apply(CatalogPolicy::Enforce).is_err());
    }

    #[test]
    fn test_catalog_check_parse_failure() {
        let check = CatalogCheck::run("SELECT * FROM", &SchemaCatalog::platform());
        assert!(!check.parsed);
        assert!(check.parse_error.is_some());
        assert!(check.apply(CatalogPolicy::Off).is_ok());
        assert!(check.apply(CatalogPolicy::Warn).is_ok());
        assert!(check.apply(CatalogPolicy::Enforce).is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("ENFORCE".parse::<CatalogPolicy>().unwrap(), CatalogPolicy::Enforce);
        assert_eq!(" off ".parse::<CatalogPolicy>().unwrap(), CatalogPolicy::Off);
        assert!("strict".parse::<CatalogPolicy>().is_err());
    }
}
