use axum::http::StatusCode;
use prometheus::{Encoder, TextEncoder};

use crate::middleware::ops::OpsAuth;

/// Prometheus scrape endpoint, ops-key gated.
pub async fn metrics(_ops: OpsAuth) -> Result<String, (StatusCode, String)> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    String::from_utf8(buffer).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
