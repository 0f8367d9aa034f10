use axum::Extension;
use uuid::Uuid;

use crate::database::models::Report;
use crate::middleware::{ApiPath, ApiResponse, ApiResult, JsonBody, ValidatedUser};
use crate::services::report_service::TransitionInput;
use crate::services::ReportService;
use crate::workflow::WorkflowAction;

async fn apply(
    user: ValidatedUser,
    id: Uuid,
    action: WorkflowAction,
    input: Option<TransitionInput>,
) -> ApiResult<Report> {
    let report = ReportService::new()
        .await?
        .transition(id, action, user.actor(), input.unwrap_or_default())
        .await?;
    Ok(ApiResponse::success(report))
}

/// POST /api/reports/:id/submit `{signatureData?}`
pub async fn submit_post(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    body: Option<JsonBody<TransitionInput>>,
) -> ApiResult<Report> {
    apply(user, id, WorkflowAction::Submit, body.map(|JsonBody(b)| b)).await
}

/// POST /api/reports/:id/approve `{signatureData?, storageLocation?}`
pub async fn approve_post(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    body: Option<JsonBody<TransitionInput>>,
) -> ApiResult<Report> {
    apply(user, id, WorkflowAction::Approve, body.map(|JsonBody(b)| b)).await
}

/// POST /api/reports/:id/reject `{reason}`
pub async fn reject_post(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    body: Option<JsonBody<TransitionInput>>,
) -> ApiResult<Report> {
    apply(user, id, WorkflowAction::Reject, body.map(|JsonBody(b)| b)).await
}
