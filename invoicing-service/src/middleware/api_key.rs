use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Accepted keys, shared by every request.
#[derive(Clone)]
pub struct ApiKeySettings {
    keys: Arc<Vec<String>>,
}

impl ApiKeySettings {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }
}

/// Require a valid `X-API-Key` header on every request except the public
/// surface: swagger, health checks, the service root, and favicon.
///
/// The 401 bodies are a fixed shape predating the response envelope, kept
/// for client compatibility.
pub async fn require_api_key(
    State(settings): State<ApiKeySettings>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_lowercase();
    if path.contains("/swagger")
        || path.contains("/health")
        || path == "/"
        || path == "/favicon.ico"
    {
        return next.run(req).await;
    }

    let header = match req.headers().get(API_KEY_HEADER) {
        Some(value) => value,
        None => {
            warn!(path = %req.uri().path(), "API Key was not provided");
            return unauthorized("API Key was not provided");
        }
    };

    let provided = header.to_str().unwrap_or_default();
    if !settings.keys.iter().any(|key| key == provided) {
        warn!(path = %req.uri().path(), "Unauthorized API key");
        return unauthorized("Unauthorized");
    }

    debug!(path = %req.uri().path(), "API key authenticated");
    next.run(req).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "message": message,
            "statusCode": 401
        })),
    )
        .into_response()
}
