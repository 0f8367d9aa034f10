// handlers/public/health.rs - GET /api/health

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::database::manager::DatabaseManager;

pub async fn health() -> impl IntoResponse {
    let now = chrono::Utc::now();
    let version = env!("CARGO_PKG_VERSION");

    match DatabaseManager::health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "version": version,
                "database": "ok",
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "version": version,
                    "database": "unavailable",
                })),
            )
        }
    }
}
