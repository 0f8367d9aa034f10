// handlers/protected/files.rs - Upload, download and delete report attachments

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::ReportFile;
use crate::error::ApiError;
use crate::middleware::{ApiPath, ApiResponse, ApiResult, ValidatedUser};
use crate::services::file_service::Upload;
use crate::services::FileService;

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Upload exceeds the request size limit")
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// POST /api/files/upload
///
/// Multipart form with one or more `files` parts and an optional `reportId`.
pub async fn upload_post(
    Extension(user): Extension<ValidatedUser>,
    multipart: Result<Multipart, axum::extract::multipart::MultipartRejection>,
) -> ApiResult<Value> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut uploads = Vec::new();
    let mut report_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("files") | Some("file") => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                uploads.push(Upload {
                    original_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("reportId") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let id = Uuid::parse_str(raw)
                        .map_err(|_| ApiError::invalid_field("reportId", "Must be a valid report id"))?;
                    report_id = Some(id);
                }
            }
            other => {
                tracing::debug!("Ignoring multipart field {:?}", other);
            }
        }
    }

    let files = FileService::new().await?.upload(user.actor(), report_id, uploads).await?;
    Ok(ApiResponse::created(json!({ "files": files })))
}

/// GET /api/files/:id - raw file contents
pub async fn download_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (file, bytes) = FileService::new().await?.download(id, user.actor()).await?;

    let filename: String = file
        .original_name
        .chars()
        .map(|c| if c == '"' || c == '\\' || !c.is_ascii() || c.is_ascii_control() { '_' } else { c })
        .collect();

    Ok((
        [
            (header::CONTENT_TYPE, file.mime_type),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        bytes,
    ))
}

/// DELETE /api/files/:id
pub async fn file_delete(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<ReportFile> {
    let file = FileService::new().await?.delete(id, user.actor()).await?;
    Ok(ApiResponse::success(file))
}
