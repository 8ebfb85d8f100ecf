use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::{
        application::{
            ApplicationQuery, ApplicationResponse, CreateApplicationRequest, DecisionRequest,
            SchoolApplication, UpdateApplicationRequest,
        },
        auth::AuthenticatedUser,
        user::UserRole,
    },
    services::{
        applications::{ApplicationError, ApplicationService},
        audit::{self, AuditEntry},
        auth::AuthService,
        documents::DocumentService,
        metrics,
    },
    AppState,
};

use super::{client_ip, error_response, internal_error};

/// Stamps the draft's id onto an error payload.
fn with_application_id(
    (status, Json(mut payload)): (StatusCode, Json<Value>),
    id: Uuid,
) -> (StatusCode, Json<Value>) {
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("application_id".into(), json!(id));
    }
    (status, Json(payload))
}

fn require_school_admin(user: &AuthenticatedUser) -> Option<(StatusCode, Json<Value>)> {
    match user.role {
        UserRole::SchoolAdmin | UserRole::GlobalAdmin => None,
        _ => Some((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Only school admins file applications" })),
        )),
    }
}

async fn respond_with_documents(
    state: &AppState,
    app: SchoolApplication,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let documents = DocumentService::titles(&state.db, app.id)
        .await
        .map_err(internal_error)?;
    let response = ApplicationResponse::from_row(app, documents).map_err(internal_error)?;
    Ok(Json(serde_json::to_value(response).unwrap()))
}

pub async fn create_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if let Some(err) = require_school_admin(&user) {
        return Err(err);
    }

    let mut app = ApplicationService::create(&state.db, user.user_id, &body)
        .await
        .map_err(error_response)?;

    if body.submit {
        // The draft row already exists at this point. If the submit is
        // refused, the client must still learn its id, or a retry would
        // file a duplicate.
        app = ApplicationService::submit(&state.db, app.id, &user)
            .await
            .map_err(|e| with_application_id(error_response(e), app.id))?;
        after_submission(&state, &user, &headers, &app).await;
    }

    let body = respond_with_documents(&state, app).await?;
    Ok((StatusCode::CREATED, body))
}

pub async fn list_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ApplicationQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let page = params.page.unwrap_or(1).max(1);

    let (rows, total) = ApplicationService::list(&state.db, &user, &params)
        .await
        .map_err(error_response)?;

    let applications: Vec<Value> = rows
        .into_iter()
        .map(|app| {
            ApplicationResponse::from_row(app, Vec::new())
                .map(|r| serde_json::to_value(r).unwrap())
        })
        .collect::<Result<_, _>>()
        .map_err(internal_error)?;

    Ok(Json(json!({
        "applications": applications,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

pub async fn get_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let app = ApplicationService::get(&state.db, id)
        .await
        .map_err(error_response)?;
    if !ApplicationService::can_view(&user, &app) {
        return Err(error_response(ApplicationError::Forbidden));
    }
    respond_with_documents(&state, app).await
}

pub async fn update_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateApplicationRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let app = ApplicationService::update_draft(&state.db, id, &user, &body)
        .await
        .map_err(error_response)?;
    respond_with_documents(&state, app).await
}

pub async fn submit_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let app = ApplicationService::submit(&state.db, id, &user)
        .await
        .map_err(error_response)?;

    after_submission(&state, &user, &headers, &app).await;
    respond_with_documents(&state, app).await
}

/// Submission side effects: metrics, audit, receipt email (best effort).
async fn after_submission(
    state: &AppState,
    user: &AuthenticatedUser,
    headers: &HeaderMap,
    app: &SchoolApplication,
) {
    metrics::SUBMISSIONS_COUNTER
        .with_label_values(&[app.country.as_deref().unwrap_or("unknown")])
        .inc();

    audit::log(
        state.db.clone(),
        AuditEntry {
            user_id: Some(user.user_id),
            user_name: None,
            action: "application.submit".into(),
            resource_type: Some("application".into()),
            resource_id: Some(app.id.to_string()),
            resource_label: Some(app.school_name.clone()),
            ip_address: client_ip(headers),
        },
    );

    if let (Some(email_svc), Some(contact)) = (state.email.as_deref(), app.email.as_deref()) {
        if let Err(e) = email_svc
            .send_submission_receipt(contact, &app.school_name)
            .await
        {
            tracing::warn!("submission receipt email failed: {e}");
        }
    }
}

async fn decide(
    state: AppState,
    user: AuthenticatedUser,
    headers: HeaderMap,
    id: Uuid,
    body: DecisionRequest,
    approve: bool,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let reviewer_name = AuthService::display_name(&state.db, user.user_id)
        .await
        .map_err(internal_error)?;

    let result = if approve {
        ApplicationService::approve(
            &state.db,
            id,
            &user,
            body.stage,
            &reviewer_name,
            body.comments.as_deref(),
        )
        .await
    } else {
        ApplicationService::reject(
            &state.db,
            id,
            &user,
            body.stage,
            &reviewer_name,
            body.comments.as_deref(),
        )
        .await
    };
    let app = result.map_err(error_response)?;

    let verdict = if approve { "approved" } else { "rejected" };
    metrics::DECISIONS_COUNTER
        .with_label_values(&[&body.stage.to_string(), verdict])
        .inc();

    audit::log(
        state.db.clone(),
        AuditEntry {
            user_id: Some(user.user_id),
            user_name: Some(reviewer_name),
            action: format!("application.{}.{}", body.stage, verdict),
            resource_type: Some("application".into()),
            resource_id: Some(app.id.to_string()),
            resource_label: Some(app.school_name.clone()),
            ip_address: client_ip(&headers),
        },
    );

    if let (Some(email_svc), Some(contact)) = (state.email.as_deref(), app.email.as_deref()) {
        if let Err(e) = email_svc
            .send_decision_notification(
                contact,
                &app.school_name,
                &body.stage.to_string(),
                approve,
                body.comments.as_deref(),
            )
            .await
        {
            tracing::warn!("decision notification email failed: {e}");
        }
    }

    respond_with_documents(&state, app).await
}

pub async fn approve_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    decide(state, user, headers, id, body, true).await
}

pub async fn reject_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    decide(state, user, headers, id, body, false).await
}

pub async fn application_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role == UserRole::SchoolAdmin {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Admin access required" })),
        ));
    }

    let stats = ApplicationService::stats(&state.db)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(stats).unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_immediate_submit_reports_the_persisted_draft_id() {
        let id = Uuid::new_v4();
        let err = error_response(ApplicationError::Validation(
            "Missing required fields: phone".into(),
        ));

        let (status, Json(payload)) = with_application_id(err, id);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            payload["error"],
            json!("Missing required fields: phone")
        );
        assert_eq!(payload["application_id"], json!(id));
    }
}
