use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{routes::error_response, services::applications::ApplicationService, AppState};

#[derive(Debug, Deserialize)]
pub struct DirectoryQuery {
    pub search: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Public directory of approved schools. No authentication required.
pub async fn list_schools(
    State(state): State<AppState>,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(20);

    let (schools, total) = ApplicationService::directory(
        &state.db,
        query.search.as_deref(),
        query.country.as_deref(),
        query.state.as_deref(),
        page,
        limit,
    )
    .await
    .map_err(error_response)?;

    Ok(Json(json!({
        "schools": schools,
        "total": total,
        "page": page.max(1),
        "limit": limit.clamp(1, 200),
    })))
}
