use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{
        application::ApplicationStatus,
        auth::AuthenticatedUser,
        document::ApplicationDocument,
        user::UserRole,
    },
    services::{
        applications::{ApplicationError, ApplicationService},
        encryption,
    },
};

const DOC_COLS: &str =
    "id, application_id, uploader_id, title, original_filename, storage_path,
     content_type, size_bytes, iv, auth_tag, created_at";

pub struct DocumentService;

impl DocumentService {
    /// Accept a multipart upload (`file` + optional `title`), encrypt the
    /// payload with the application's derived key and store it on disk.
    /// Uploads are only accepted while the application is still a draft.
    pub async fn upload(
        pool: &PgPool,
        user: &AuthenticatedUser,
        application_id: Uuid,
        document_dir: &str,
        master_key: &[u8; 32],
        mut multipart: Multipart,
    ) -> Result<ApplicationDocument, ApplicationError> {
        let app = ApplicationService::get(pool, application_id).await?;
        if user.role != UserRole::GlobalAdmin && app.owner_id != user.user_id {
            return Err(ApplicationError::Forbidden);
        }
        if app.status()? != ApplicationStatus::Draft {
            return Err(ApplicationError::StageOrder(
                "documents can only be uploaded while the application is a draft".into(),
            ));
        }

        let mut file_data: Option<(Vec<u8>, String, String)> = None;
        let mut title: Option<String> = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApplicationError::Validation(format!("multipart: {e}")))?
        {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or("document").to_string();
                    let ct = field
                        .content_type()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| {
                            mime_guess::from_path(&filename)
                                .first_or_octet_stream()
                                .to_string()
                        });
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApplicationError::Validation(format!("multipart: {e}")))?
                        .to_vec();
                    file_data = Some((bytes, filename, ct));
                }
                "title" => {
                    title = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| ApplicationError::Validation(format!("multipart: {e}")))?,
                    );
                }
                _ => {}
            }
        }

        let (bytes, original_filename, content_type) = file_data
            .ok_or_else(|| ApplicationError::Validation("No file field in upload".into()))?;

        let key = encryption::derive_application_key(master_key, application_id)?;
        let (ciphertext, iv, tag) = encryption::encrypt_document(&bytes, &key)?;

        let doc_dir = PathBuf::from(document_dir).join(application_id.to_string());
        tokio::fs::create_dir_all(&doc_dir)
            .await
            .map_err(|e| ApplicationError::Internal(e.into()))?;

        let ext = Path::new(&original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let file_id = Uuid::new_v4();
        let storage_filename = format!("{}.{}.enc", file_id, ext);
        let storage_path_full = doc_dir.join(&storage_filename);
        let storage_path_rel = format!("{}/{}", application_id, storage_filename);

        tokio::fs::write(&storage_path_full, &ciphertext)
            .await
            .map_err(|e| ApplicationError::Internal(e.into()))?;

        let doc = sqlx::query_as::<_, ApplicationDocument>(&format!(
            "INSERT INTO application_documents
                (id, application_id, uploader_id, title, original_filename, storage_path,
                 content_type, size_bytes, iv, auth_tag)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {DOC_COLS}"
        ))
        .bind(file_id)
        .bind(application_id)
        .bind(user.user_id)
        .bind(title.unwrap_or_else(|| original_filename.clone()))
        .bind(&original_filename)
        .bind(&storage_path_rel)
        .bind(&content_type)
        .bind(bytes.len() as i64)
        .bind(hex::encode(&iv))
        .bind(hex::encode(&tag))
        .fetch_one(pool)
        .await?;

        Ok(doc)
    }

    pub async fn list(
        pool: &PgPool,
        user: &AuthenticatedUser,
        application_id: Uuid,
    ) -> Result<Vec<ApplicationDocument>, ApplicationError> {
        let app = ApplicationService::get(pool, application_id).await?;
        if !ApplicationService::can_view(user, &app) {
            return Err(ApplicationError::Forbidden);
        }

        let docs = sqlx::query_as::<_, ApplicationDocument>(&format!(
            "SELECT {DOC_COLS} FROM application_documents
             WHERE application_id = $1
             ORDER BY created_at"
        ))
        .bind(application_id)
        .fetch_all(pool)
        .await?;
        Ok(docs)
    }

    /// Decrypt and return a document's plaintext bytes with its metadata.
    pub async fn download(
        pool: &PgPool,
        user: &AuthenticatedUser,
        application_id: Uuid,
        document_id: Uuid,
        document_dir: &str,
        master_key: &[u8; 32],
    ) -> Result<(ApplicationDocument, Vec<u8>), ApplicationError> {
        let app = ApplicationService::get(pool, application_id).await?;
        if !ApplicationService::can_view(user, &app) {
            return Err(ApplicationError::Forbidden);
        }

        let doc = sqlx::query_as::<_, ApplicationDocument>(&format!(
            "SELECT {DOC_COLS} FROM application_documents
             WHERE id = $1 AND application_id = $2"
        ))
        .bind(document_id)
        .bind(application_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApplicationError::NotFound)?;

        let ciphertext = tokio::fs::read(PathBuf::from(document_dir).join(&doc.storage_path))
            .await
            .map_err(|e| ApplicationError::Internal(e.into()))?;

        let iv = hex::decode(&doc.iv).map_err(|e| ApplicationError::Internal(e.into()))?;
        let tag = hex::decode(&doc.auth_tag).map_err(|e| ApplicationError::Internal(e.into()))?;
        let key = encryption::derive_application_key(master_key, application_id)?;
        let plaintext = encryption::decrypt_document(&ciphertext, &iv, &tag, &key)?;

        Ok((doc, plaintext))
    }

    /// Remove a document row and its encrypted file. Draft-only, owner-only,
    /// mirroring upload.
    pub async fn delete(
        pool: &PgPool,
        user: &AuthenticatedUser,
        application_id: Uuid,
        document_id: Uuid,
        document_dir: &str,
    ) -> Result<bool, ApplicationError> {
        let app = ApplicationService::get(pool, application_id).await?;
        if user.role != UserRole::GlobalAdmin && app.owner_id != user.user_id {
            return Err(ApplicationError::Forbidden);
        }
        if app.status()? != ApplicationStatus::Draft {
            return Err(ApplicationError::StageOrder(
                "documents can only be removed while the application is a draft".into(),
            ));
        }

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT storage_path FROM application_documents
             WHERE id = $1 AND application_id = $2",
        )
        .bind(document_id)
        .bind(application_id)
        .fetch_optional(pool)
        .await?;

        let Some((storage_path,)) = row else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM application_documents WHERE id = $1")
            .bind(document_id)
            .execute(pool)
            .await?;

        let _ = tokio::fs::remove_file(PathBuf::from(document_dir).join(&storage_path)).await;

        Ok(true)
    }

    /// Titles of a single application's documents, for the detail payload.
    pub async fn titles(pool: &PgPool, application_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT title FROM application_documents
             WHERE application_id = $1
             ORDER BY created_at",
        )
        .bind(application_id)
        .fetch_all(pool)
        .await
    }
}
