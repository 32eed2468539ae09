use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    ValidationError(Vec<String>),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("{public_message}")]
    OperationFailed {
        public_message: &'static str,
        source: anyhow::Error,
    },
}

impl AppError {
    /// Swap the client-facing message of a server-side failure for an
    /// operation-specific one. Client errors (4xx variants) pass through
    /// untouched, as does `EmailError`, whose message is already public.
    pub fn with_operation(self, public_message: &'static str) -> Self {
        match self {
            AppError::DatabaseError(source)
            | AppError::ConfigError(source)
            | AppError::InternalError(source)
            | AppError::OperationFailed { source, .. } => AppError::OperationFailed {
                public_message,
                source,
            },
            other => other,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationError(flatten_validation_errors(&errors))
    }
}

/// Flattens validator's per-field error map into a stable, readable list.
/// Fields are visited in name order so responses are deterministic.
pub fn flatten_validation_errors(errors: &validator::ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter()
                .map(|err| match &err.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return AppError::Conflict(anyhow::anyhow!("Resource already exists"));
            }
        }
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            AppError::ValidationError(errors) => (
                StatusCode::BAD_REQUEST,
                "Invalid input data".to_string(),
                errors,
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), Vec::new()),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), Vec::new()),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), Vec::new()),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), Vec::new()),
            AppError::EmailError(message) => {
                tracing::error!(error = %message, "email delivery failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message, Vec::new())
            }
            AppError::OperationFailed {
                public_message,
                source,
            } => {
                tracing::error!(error = ?source, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    public_message.to_string(),
                    Vec::new(),
                )
            }
            AppError::DatabaseError(err)
            | AppError::ConfigError(err)
            | AppError::InternalError(err) => {
                tracing::error!(error = ?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                    Vec::new(),
                )
            }
        };

        let body = ApiResponse::<serde_json::Value>::error_with_details(message, errors);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn validation_error_renders_bad_request_envelope() {
        let err = AppError::ValidationError(vec![
            "Quantity must be greater than 0".to_string(),
            "Unit price cannot be negative".to_string(),
        ]);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Invalid input data");
        assert!(body["data"].is_null());
        assert_eq!(
            body["errors"],
            serde_json::json!([
                "Quantity must be greater than 0",
                "Unit price cannot be negative"
            ])
        );
    }

    #[test]
    fn with_operation_rewrites_server_failures_only() {
        let db = AppError::DatabaseError(anyhow::anyhow!("connection reset"))
            .with_operation("An error occurred while creating the invoice");
        match db {
            AppError::OperationFailed { public_message, .. } => {
                assert_eq!(
                    public_message,
                    "An error occurred while creating the invoice"
                );
            }
            other => panic!("expected OperationFailed, got {other:?}"),
        }

        let not_found = AppError::NotFound(anyhow::anyhow!("Invoice not found"))
            .with_operation("An error occurred while retrieving the invoice");
        match not_found {
            AppError::NotFound(err) => assert_eq!(err.to_string(), "Invoice not found"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = AppError::Conflict(anyhow::anyhow!(
            "A customer with this email already exists"
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
