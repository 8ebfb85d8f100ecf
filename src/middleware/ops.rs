use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::AppState;

/// Extractor that validates the `X-Ops-Key` header against `config.ops_key`.
/// Guards operational endpoints (Prometheus scrape) that are not user-facing.
pub struct OpsAuth;

impl FromRequestParts<AppState> for OpsAuth {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get("X-Ops-Key")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing X-Ops-Key header"))?;

        if key != state.config.ops_key {
            return Err((StatusCode::UNAUTHORIZED, "Invalid ops key"));
        }

        Ok(OpsAuth)
    }
}
