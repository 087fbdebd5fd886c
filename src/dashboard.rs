//! Dashboard Statistics - Platform-wide counters from one aggregate query
//!
//! Errors never propagate from here: a failed or empty read yields `None`.

use crate::db::DatabaseEndpoint;
use crate::execution::{error_payload, normalize_rows};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

pub const DASHBOARD_STATS_QUERY: &str = r#"
SELECT
  (SELECT COUNT(DISTINCT user_id) FROM public.models) as total_users,
  (SELECT COUNT(*) FROM public.models) as total_models,
  (SELECT COUNT(*) FROM public.models WHERE status = 'completed') as completed_models,
  (SELECT COUNT(*) FROM public.models WHERE status = 'processing') as processing_models,
  (SELECT COUNT(*) FROM public.images) as total_images,
  (SELECT COUNT(*) FROM public.samples) as total_samples,
  (SELECT SUM(credits) FROM public.credits) as total_credits
"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(alias = "total_users")]
    pub total_users: Option<i64>,
    #[serde(alias = "total_models")]
    pub total_models: Option<i64>,
    #[serde(alias = "completed_models")]
    pub completed_models: Option<i64>,
    #[serde(alias = "processing_models")]
    pub processing_models: Option<i64>,
    #[serde(alias = "total_images")]
    pub total_images: Option<i64>,
    #[serde(alias = "total_samples")]
    pub total_samples: Option<i64>,
    #[serde(alias = "total_credits")]
    pub total_credits: Option<f64>,
}

pub struct DashboardService {
    db: Arc<dyn DatabaseEndpoint>,
}

impl DashboardService {
    pub fn new(db: Arc<dyn DatabaseEndpoint>) -> Self {
        Self { db }
    }

    pub async fn dashboard_stats(&self) -> Option<DashboardStats> {
        let payload = match self.db.execute_query(DASHBOARD_STATS_QUERY).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to fetch dashboard stats: {}", e);
                return None;
            }
        };

        if let Some(message) = payload.as_ref().and_then(error_payload) {
            error!("Failed to fetch dashboard stats: {}", message);
            return None;
        }

        let first = match normalize_rows(payload) {
            Ok(rows) => rows.into_iter().next()?,
            Err(e) => {
                error!("Failed to fetch dashboard stats: {}", e);
                return None;
            }
        };

        serde_json::from_value(serde_json::Value::Object(first))
            .map_err(|e| error!("Failed to decode dashboard stats: {}", e))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RemoteError;
    use crate::testing::FakeDatabase;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_row_decoded() {
        let db = Arc::new(FakeDatabase::returning(Some(json!([{
            "total_users": 12, "total_models": 30, "completed_models": 20,
            "processing_models": 4, "total_images": 900, "total_samples": 300,
            "total_credits": 1250.5
        }]))));
        let stats = DashboardService::new(db).dashboard_stats().await.unwrap();
        assert_eq!(stats.total_users, Some(12));
        assert_eq!(stats.total_credits, Some(1250.5));
    }

    #[tokio::test]
    async fn test_null_sum_allowed() {
        let db = Arc::new(FakeDatabase::returning(Some(json!({"total_users": 0, "total_credits": null}))));
        let stats = DashboardService::new(db).dashboard_stats().await.unwrap();
        assert_eq!(stats.total_users, Some(0));
        assert_eq!(stats.total_credits, None);
    }

    #[tokio::test]
    async fn test_errors_become_none() {
        let db = Arc::new(FakeDatabase::failing(RemoteError::new("boom")));
        assert!(DashboardService::new(db).dashboard_stats().await.is_none());

        let empty = Arc::new(FakeDatabase::returning(Some(json!([]))));
        assert!(DashboardService::new(empty).dashboard_stats().await.is_none());

        let garbled = Arc::new(FakeDatabase::returning(Some(json!([{"total_users": "many"}]))));
        assert!(DashboardService::new(garbled).dashboard_stats().await.is_none());
    }

    #[tokio::test]
    async fn test_error_payload_becomes_none() {
        let db = Arc::new(FakeDatabase::returning(Some(json!({
            "error": "relation \"public.samples\" does not exist"
        }))));
        let service = DashboardService::new(db.clone());
        assert!(service.dashboard_stats().await.is_none());
        assert_eq!(db.queries(), vec![DASHBOARD_STATS_QUERY.to_string()]);
    }
}
