use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One uploaded KYS document, stored encrypted at rest.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApplicationDocument {
    pub id: Uuid,
    pub application_id: Uuid,
    pub uploader_id: Uuid,
    pub title: String,
    pub original_filename: String,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// AES-GCM nonce and tag, hex-encoded.
    #[serde(skip_serializing)]
    pub iv: String,
    #[serde(skip_serializing)]
    pub auth_tag: String,
    pub created_at: DateTime<Utc>,
}
