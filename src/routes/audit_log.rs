use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::{auth::AuthenticatedUser, user::UserRole},
    routes::internal_error,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    /// Matches action prefixes, e.g. `application.` or `document.upload`.
    pub action: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub resource_label: Option<String>,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

/// Global admin: paginated audit trail, newest first.
pub async fn list_audit_log(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::GlobalAdmin {
        return Err((StatusCode::FORBIDDEN, Json(json!({ "error": "Access denied" }))));
    }

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;
    let prefix = query.action.map(|a| format!("{a}%"));

    let entries = sqlx::query_as::<_, AuditRow>(
        "SELECT id, user_id, user_name, action, resource_type, resource_id,
                resource_label, ip_address, created_at
         FROM audit_log
         WHERE ($1::text IS NULL OR action LIKE $1)
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(&prefix)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(internal_error)?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_log WHERE ($1::text IS NULL OR action LIKE $1)",
    )
    .bind(&prefix)
    .fetch_one(&state.db)
    .await
    .map_err(internal_error)?;

    Ok(Json(json!({
        "entries": entries,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}
