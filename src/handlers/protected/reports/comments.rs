use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiPath, ApiResponse, ApiResult, JsonBody, ValidatedUser};
use crate::services::report_service::CommentView;
use crate::services::ReportService;

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
}

/// POST /api/reports/:id/comments
pub async fn comment_post(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    JsonBody(request): JsonBody<CommentRequest>,
) -> ApiResult<CommentView> {
    let comment = ReportService::new()
        .await?
        .add_comment(id, user.actor(), &request.content)
        .await?;
    Ok(ApiResponse::created(comment))
}
