use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::dtos::ApiResponse;
use crate::services::get_metrics;
use crate::startup::AppState;

/// Service info
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service name and version")),
    tag = "Platform"
)]
pub async fn service_info() -> impl IntoResponse {
    Json(ApiResponse::success(
        "Invoicing System API",
        json!({
            "service": "invoicing-service",
            "version": env!("CARGO_PKG_VERSION")
        }),
    ))
}

/// Health probe
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are healthy"),
        (status = 503, description = "Database is unreachable")
    ),
    tag = "Platform"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "invoicing-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "invoicing-service",
                "error": err.to_string()
            })),
        ),
    }
}

/// Prometheus metrics exposition
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Metrics in Prometheus text format"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Platform"
)]
pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics()
}
