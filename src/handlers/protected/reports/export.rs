use axum::{http::header, response::IntoResponse, Extension, Json};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{ApiPath, ValidatedUser};
use crate::services::ReportService;

/// GET /api/reports/:id/export
///
/// The bare export document (no success envelope) served as an attachment.
pub async fn export_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let export = ReportService::new().await?.export(id, user.actor()).await?;
    let disposition = format!("attachment; filename=\"{}\"", export.filename());

    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(export)))
}
