use axum::Extension;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::ReportStep;
use crate::error::ApiError;
use crate::middleware::{ApiPath, ApiResponse, ApiResult, JsonBody, ValidatedUser};
use crate::services::ReportService;
use crate::steps::completion::CompletionReport;
use crate::steps::signals::SignalTests;
use crate::steps::StepName;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStepRequest {
    #[serde(default)]
    pub step_name: String,
    #[serde(default)]
    pub data: Value,
}

/// PUT /api/reports/:id/steps `{stepName, data}`
pub async fn step_put(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    JsonBody(request): JsonBody<SaveStepRequest>,
) -> ApiResult<ReportStep> {
    let step = ReportService::new()
        .await?
        .save_step(id, user.actor(), &request.step_name, request.data)
        .await?;
    Ok(ApiResponse::success(step))
}

/// GET /api/reports/:id/completion
pub async fn completion_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<CompletionReport> {
    let completion = ReportService::new().await?.completion(id, user.actor()).await?;
    Ok(ApiResponse::success(completion))
}

/// POST /api/reports/:id/steps/:step/generate
///
/// Only `signal_tests` can be generated; the rows come from the saved
/// pre-configuration.
pub async fn signals_generate(
    Extension(user): Extension<ValidatedUser>,
    ApiPath((id, step)): ApiPath<(Uuid, String)>,
) -> ApiResult<SignalTests> {
    let step: StepName = step.parse()?;
    if step != StepName::SignalTests {
        return Err(ApiError::bad_request(format!("Step '{}' cannot be generated", step)));
    }

    let generated = ReportService::new().await?.generate_signals(id, user.actor()).await?;
    Ok(ApiResponse::success(generated))
}
