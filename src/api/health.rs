//! Liveness endpoint for monitoring.

use crate::errors::AppError;
use crate::service::DashboardCore;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// GET /health
pub async fn health_check(State(core): State<Arc<DashboardCore>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let checked = tokio::task::spawn_blocking(move || core.health()).await;
    match checked.map_err(|error| AppError::Internal(error.to_string())).and_then(|result| result) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "version": version })),
        ),
        Err(error) => {
            tracing::error!(error = %error, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable", "version": version })),
            )
        }
    }
}
