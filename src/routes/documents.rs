use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::auth::AuthenticatedUser,
    services::{
        audit::{self, AuditEntry},
        documents::DocumentService,
        encryption, metrics,
    },
    AppState,
};

use super::{client_ip, error_response, internal_error};

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(application_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let master_key =
        encryption::parse_master_key(&state.config.document_master_key).map_err(internal_error)?;

    let doc = DocumentService::upload(
        &state.db,
        &user,
        application_id,
        &state.config.document_dir,
        &master_key,
        multipart,
    )
    .await
    .map_err(error_response)?;

    let country = crate::services::applications::ApplicationService::get(&state.db, application_id)
        .await
        .ok()
        .and_then(|a| a.country);
    metrics::DOCUMENT_UPLOADS_COUNTER
        .with_label_values(&[country.as_deref().unwrap_or("unknown")])
        .inc();

    audit::log(
        state.db.clone(),
        AuditEntry {
            user_id: Some(user.user_id),
            user_name: None,
            action: "document.upload".into(),
            resource_type: Some("document".into()),
            resource_id: Some(doc.id.to_string()),
            resource_label: Some(doc.title.clone()),
            ip_address: client_ip(&headers),
        },
    );

    Ok((StatusCode::CREATED, Json(serde_json::to_value(doc).unwrap())))
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    DocumentService::list(&state.db, &user, application_id)
        .await
        .map(|docs| Json(serde_json::to_value(docs).unwrap()))
        .map_err(error_response)
}

pub async fn download_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((application_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let master_key =
        encryption::parse_master_key(&state.config.document_master_key).map_err(internal_error)?;

    let (doc, plaintext) = DocumentService::download(
        &state.db,
        &user,
        application_id,
        document_id,
        &state.config.document_dir,
        &master_key,
    )
    .await
    .map_err(error_response)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, doc.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", doc.original_filename),
        )
        .body(Body::from(plaintext))
        .map_err(internal_error)
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path((application_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let deleted = DocumentService::delete(
        &state.db,
        &user,
        application_id,
        document_id,
        &state.config.document_dir,
    )
    .await
    .map_err(error_response)?;

    if !deleted {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Document not found" })),
        ));
    }

    audit::log(
        state.db.clone(),
        AuditEntry {
            user_id: Some(user.user_id),
            user_name: None,
            action: "document.delete".into(),
            resource_type: Some("document".into()),
            resource_id: Some(document_id.to_string()),
            resource_label: None,
            ip_address: client_ip(&headers),
        },
    );

    Ok(Json(json!({ "message": "Document deleted" })))
}
