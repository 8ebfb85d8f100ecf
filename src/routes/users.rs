use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use axum::http::HeaderMap;

use crate::{
    models::{
        auth::AuthenticatedUser,
        user::{User, UserProfile, UserRole},
    },
    routes::client_ip,
    services::audit::{self, AuditEntry},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<UserRole>,
    pub country: Option<String>,
}

/// Global admin: list administrator and school accounts.
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::GlobalAdmin {
        return Err((StatusCode::FORBIDDEN, Json(json!({ "error": "Access denied" }))));
    }

    let users = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, full_name, role, country, state, is_active,
                created_at, updated_at
         FROM users
         WHERE ($1::text IS NULL OR role = $1)
           AND ($2::text IS NULL OR LOWER(country) = LOWER($2))
         ORDER BY created_at DESC",
    )
    .bind(query.role.map(|r| r.to_string()))
    .bind(query.country)
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;

    let profiles: Vec<UserProfile> = users.into_iter().map(UserProfile::from).collect();
    Ok(Json(json!({ "users": profiles })))
}

/// Global admin: deactivate an account and revoke its sessions.
pub async fn deactivate_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::GlobalAdmin {
        return Err((StatusCode::FORBIDDEN, Json(json!({ "error": "Access denied" }))));
    }
    if id == user.user_id {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Cannot deactivate your own account" })),
        ));
    }

    let res = sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    if res.rows_affected() == 0 {
        return Err((StatusCode::NOT_FOUND, Json(json!({ "error": "User not found" }))));
    }

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .ok();

    audit::log(
        state.db.clone(),
        AuditEntry {
            user_id: Some(user.user_id),
            user_name: None,
            action: "user.deactivate".into(),
            resource_type: Some("user".into()),
            resource_id: Some(id.to_string()),
            resource_label: None,
            ip_address: client_ip(&headers),
        },
    );

    Ok(Json(json!({ "success": true })))
}

/// Global admin: reactivate a previously deactivated account.
pub async fn reactivate_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::GlobalAdmin {
        return Err((StatusCode::FORBIDDEN, Json(json!({ "error": "Access denied" }))));
    }

    let res = sqlx::query("UPDATE users SET is_active = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    if res.rows_affected() == 0 {
        return Err((StatusCode::NOT_FOUND, Json(json!({ "error": "User not found" }))));
    }

    audit::log(
        state.db.clone(),
        AuditEntry {
            user_id: Some(user.user_id),
            user_name: None,
            action: "user.reactivate".into(),
            resource_type: Some("user".into()),
            resource_id: Some(id.to_string()),
            resource_label: None,
            ip_address: client_ip(&headers),
        },
    );

    Ok(Json(json!({ "success": true })))
}
