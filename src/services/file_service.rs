use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::{Report, ReportFile};
use crate::error::ApiError;
use crate::storage::{FileStore, LocalFileStore, StoredFile};
use crate::types::Role;
use crate::workflow::Actor;

const FILE_COLUMNS: &str =
    "id, report_id, uploader_id, filename, original_name, mime_type, size_bytes, sha256, created_at";

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A file received from a multipart upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Strip any client-side directory components and control characters
fn clean_original_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

fn filenames(stored: &[(String, StoredFile)]) -> Vec<String> {
    stored.iter().map(|(_, file)| file.filename.clone()).collect()
}

pub struct FileService {
    pool: PgPool,
    store: Arc<dyn FileStore>,
}

impl FileService {
    pub async fn new() -> Result<Self, ApiError> {
        let pool = DatabaseManager::pool().await?;
        Ok(Self::with_store(pool, Arc::new(LocalFileStore::from_config())))
    }

    pub fn with_store(pool: PgPool, store: Arc<dyn FileStore>) -> Self {
        Self { pool, store }
    }

    /// Store each upload and record it, optionally linked to a report the
    /// uploader participates in
    pub async fn upload(
        &self,
        actor: Actor,
        report_id: Option<Uuid>,
        uploads: Vec<Upload>,
    ) -> Result<Vec<ReportFile>, ApiError> {
        if uploads.is_empty() {
            return Err(ApiError::invalid_field("files", "No files were uploaded"));
        }

        let max = config::config().storage.max_upload_bytes;
        if let Some(big) = uploads.iter().find(|u| u.bytes.len() > max) {
            return Err(ApiError::payload_too_large(format!(
                "File '{}' exceeds the {} byte upload limit",
                big.original_name, max
            )));
        }

        if let Some(report_id) = report_id {
            let report = self.report(report_id).await?;
            if actor.role != Role::Admin && !report.is_participant(actor.id) {
                return Err(ApiError::forbidden("You do not have access to this report"));
            }
        }

        // All blobs first, then every row in one transaction; any failure undoes both
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            let original_name = clean_original_name(&upload.original_name);
            match self.store.put(&original_name, &upload.bytes).await {
                Ok(file) => stored.push((original_name, file)),
                Err(e) => {
                    self.discard_stored(&filenames(&stored)).await;
                    return Err(e.into());
                }
            }
        }

        match self.record_uploads(actor, report_id, &uploads, &stored).await {
            Ok(saved) => {
                tracing::info!("Uploaded {} file(s) by {}", saved.len(), actor.id);
                Ok(saved)
            }
            Err(e) => {
                self.discard_stored(&filenames(&stored)).await;
                Err(e)
            }
        }
    }

    async fn record_uploads(
        &self,
        actor: Actor,
        report_id: Option<Uuid>,
        uploads: &[Upload],
        stored: &[(String, StoredFile)],
    ) -> Result<Vec<ReportFile>, ApiError> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(stored.len());

        for (upload, (original_name, file)) in uploads.iter().zip(stored) {
            let row = sqlx::query_as::<_, ReportFile>(&format!(
                "INSERT INTO report_files
                    (id, report_id, uploader_id, filename, original_name, mime_type, size_bytes, sha256)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING {}",
                FILE_COLUMNS
            ))
            .bind(Uuid::new_v4())
            .bind(report_id)
            .bind(actor.id)
            .bind(&file.filename)
            .bind(original_name)
            .bind(upload.mime_type.as_deref().filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MIME_TYPE))
            .bind(file.size_bytes)
            .bind(&file.sha256)
            .fetch_one(&mut *tx)
            .await?;
            saved.push(row);
        }

        tx.commit().await?;
        Ok(saved)
    }

    pub async fn get(&self, id: Uuid) -> Result<ReportFile, ApiError> {
        sqlx::query_as::<_, ReportFile>(&format!("SELECT {} FROM report_files WHERE id = $1", FILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("File not found"))
    }

    /// File metadata and contents for the uploader, participants of the
    /// linked report, or an admin
    pub async fn download(&self, id: Uuid, actor: Actor) -> Result<(ReportFile, Vec<u8>), ApiError> {
        let file = self.get(id).await?;

        let allowed = actor.role == Role::Admin
            || file.uploader_id == actor.id
            || match file.report_id {
                Some(report_id) => self.report(report_id).await?.is_participant(actor.id),
                None => false,
            };
        if !allowed {
            return Err(ApiError::forbidden("You do not have access to this file"));
        }

        let bytes = self.store.get(&file.filename).await?;
        Ok((file, bytes))
    }

    pub async fn delete(&self, id: Uuid, actor: Actor) -> Result<ReportFile, ApiError> {
        let file = self.get(id).await?;
        if actor.role != Role::Admin && file.uploader_id != actor.id {
            return Err(ApiError::forbidden("Only the uploader can delete this file"));
        }

        sqlx::query("DELETE FROM report_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.store.delete(&file.filename).await?;

        tracing::info!("File deleted: {} ({})", file.original_name, file.id);
        Ok(file)
    }

    /// Remove stored blobs whose rows are already gone. Failures are logged only.
    pub async fn discard_stored(&self, filenames: &[String]) {
        for filename in filenames {
            if let Err(e) = self.store.delete(filename).await {
                tracing::warn!("Failed to remove stored file {}: {}", filename, e);
            }
        }
    }

    async fn report(&self, id: Uuid) -> Result<Report, ApiError> {
        sqlx::query_as::<_, Report>(
            "SELECT id, title, project_ref, document_ref, revision, report_type, status, creator_id,
                    tm_id, pm_id, storage_location, created_at, updated_at, submitted_at, completed_at
             FROM reports WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Report not found"))
    }
}
