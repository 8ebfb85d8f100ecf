use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    middleware::rate_limit::check_rate_limit,
    models::{
        auth::AuthenticatedUser,
        user::{
            ChangePasswordRequest, ForgotPasswordRequest, InviteUserRequest, LoginRequest,
            RefreshTokenRequest, RegisterFromInviteRequest, ResetPasswordRequest, User,
            UserProfile, UserRole,
        },
    },
    services::{auth::AuthService, metrics},
    AppState,
};

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // Rate limit: 5 attempts per 15 min per email
    let rate_key = format!("rate:login:{}", body.email.to_lowercase());
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &rate_key, 5, 900).await?;

    match AuthService::login(
        &state.db,
        &body.email,
        &body.password,
        &state.config.jwt_secret,
        &state.config.jwt_refresh_secret,
        state.config.jwt_expiry_seconds,
        state.config.jwt_refresh_expiry_days,
    )
    .await
    {
        Ok(response) => {
            metrics::LOGINS_COUNTER.with_label_values(&["success"]).inc();
            Ok(Json(serde_json::to_value(response).unwrap()))
        }
        Err(e) => {
            metrics::LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))))
        }
    }
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AuthService::refresh(
        &state.db,
        &body.refresh_token,
        &state.config.jwt_secret,
        &state.config.jwt_refresh_secret,
        state.config.jwt_expiry_seconds,
        state.config.jwt_refresh_expiry_days,
    )
    .await
    .map(|res| Json(serde_json::to_value(res).unwrap()))
    .map_err(|e| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": e.to_string() })),
        )
    })
}

pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AuthService::logout(&state.db, &body.refresh_token, &state.config.jwt_refresh_secret)
        .await
        .map(|_| Json(json!({ "message": "Logged out" })))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// Always returns 200 to avoid leaking account existence.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // Rate limit: 3 requests per 30 min per email
    let rate_key = format!("rate:forgot:{}", body.email.to_lowercase());
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &rate_key, 3, 1800).await?;

    AuthService::request_password_reset(
        &state.db,
        state.email.as_deref(),
        &body.email,
        &state.config.app_base_url,
    )
    .await
    .map(|_| {
        metrics::PASSWORD_RESETS_COUNTER
            .with_label_values(&["requested"])
            .inc();
        Json(json!({ "message": "If an account exists, an email has been sent." }))
    })
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AuthService::reset_password(&state.db, &body.token, &body.new_password)
        .await
        .map(|_| {
            metrics::PASSWORD_RESETS_COUNTER
                .with_label_values(&["completed"])
                .inc();
            Json(json!({ "message": "Password reset" }))
        })
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

/// Open signup for school admins (the role that files applications).
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    // Rate limit: 3 signups per hour per email
    let rate_key = format!("rate:signup:{}", body.email.to_lowercase());
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &rate_key, 3, 3600).await?;

    if body.password.len() < 8 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Password must be at least 8 characters" })),
        ));
    }

    AuthService::register_school_admin(&state.db, &body.email, &body.full_name, &body.password)
        .await
        .map(|profile| {
            (
                StatusCode::CREATED,
                Json(serde_json::to_value(profile).unwrap()),
            )
        })
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// Only the global admin invites admin roles.
pub async fn invite_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<InviteUserRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::GlobalAdmin {
        return Err((StatusCode::FORBIDDEN, Json(json!({ "error": "Access denied" }))));
    }

    AuthService::create_invitation(
        &state.db,
        state.email.as_deref(),
        &body.email,
        body.role,
        body.country.as_deref(),
        body.state.as_deref(),
        Some(user.user_id),
        &state.config.app_base_url,
    )
    .await
    .map(|_| Json(json!({ "message": format!("Invitation sent to {}", body.email) })))
    .map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
    })
}

pub async fn register_from_invite(
    State(state): State<AppState>,
    Json(body): Json<RegisterFromInviteRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AuthService::register_from_invite(&state.db, &body.token, &body.full_name, &body.password)
        .await
        .map(|profile| Json(serde_json::to_value(profile).unwrap()))
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

pub async fn list_pending_invitations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::GlobalAdmin {
        return Err((StatusCode::FORBIDDEN, Json(json!({ "error": "Access denied" }))));
    }

    AuthService::list_pending_invitations(&state.db)
        .await
        .map(|invitations| Json(serde_json::to_value(invitations).unwrap()))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

pub async fn delete_invitation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::GlobalAdmin {
        return Err((StatusCode::FORBIDDEN, Json(json!({ "error": "Access denied" }))));
    }

    match AuthService::delete_invitation(&state.db, id).await {
        Ok(true) => Ok(Json(json!({ "success": true }))),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Invitation not found or already used" })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, full_name, role, country, state, is_active,
                created_at, updated_at
         FROM users WHERE id = $1",
    )
    .bind(user.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?
    .map(|u| Json(serde_json::to_value(UserProfile::from(u)).unwrap()))
    .ok_or((StatusCode::NOT_FOUND, Json(json!({ "error": "User not found" }))))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AuthService::change_password(
        &state.db,
        user.user_id,
        &body.current_password,
        &body.new_password,
    )
    .await
    .map(|_| Json(json!({ "message": "Password changed" })))
    .map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
    })
}
