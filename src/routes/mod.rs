pub mod applications;
pub mod audit_log;
pub mod auth;
pub mod documents;
pub mod health;
pub mod metrics;
pub mod schools;
pub mod users;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::services::applications::ApplicationError;

/// Maps the pipeline error taxonomy onto HTTP status codes.
pub(crate) fn error_response(e: ApplicationError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        ApplicationError::Validation(_) => StatusCode::BAD_REQUEST,
        ApplicationError::StageOrder(_) => StatusCode::CONFLICT,
        ApplicationError::NotFound => StatusCode::NOT_FOUND,
        ApplicationError::Forbidden => StatusCode::FORBIDDEN,
        ApplicationError::Database(_) | ApplicationError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() })))
}

pub(crate) fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

/// Client address for audit entries, best effort behind a proxy.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
