use axum::{response::IntoResponse, Extension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::Report;
use crate::error::ApiError;
use crate::middleware::{ApiPath, ApiQuery, ApiResponse, ApiResult, AuditContext, JsonBody, ValidatedUser};
use crate::services::report_service::{NewReport, ReportChanges, ReportDetail, ReportFilter};
use crate::services::ReportService;

/// GET /api/reports?status=&search=
///
/// Engineers see their own reports, managers the reports assigned to them,
/// admins everything. Newest activity first.
pub async fn report_list(
    Extension(user): Extension<ValidatedUser>,
    ApiQuery(filter): ApiQuery<ReportFilter>,
) -> ApiResult<Value> {
    let reports = ReportService::new().await?.list(user.actor(), filter).await?;
    Ok(ApiResponse::success(json!({ "reports": reports })))
}

/// GET /api/reports/:id
pub async fn report_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<ReportDetail> {
    let report = ReportService::new().await?.detail(id, user.actor()).await?;
    Ok(ApiResponse::success(report))
}

/// POST /api/reports
pub async fn report_post(
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<NewReport>,
) -> Result<impl IntoResponse, ApiError> {
    let report = ReportService::new().await?.create(user.actor(), input).await?;

    let context = AuditContext {
        user_id: Some(user.id),
        report_id: Some(report.id),
    };
    Ok((Extension(context), ApiResponse::created(report)))
}

/// PUT /api/reports/:id
pub async fn report_put(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    JsonBody(changes): JsonBody<ReportChanges>,
) -> ApiResult<Report> {
    let report = ReportService::new().await?.update(id, user.actor(), changes).await?;
    Ok(ApiResponse::success(report))
}

/// DELETE /api/reports/:id
pub async fn report_delete(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Value> {
    let report = ReportService::new().await?.delete(id, user.actor()).await?;
    Ok(ApiResponse::success(json!({
        "id": report.id,
        "message": "Report deleted successfully",
    })))
}
