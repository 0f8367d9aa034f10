// handlers/elevated/settings.rs - System settings

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::database::models::SystemSetting;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::SettingsService;

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    #[serde(default)]
    pub key: String,
    pub value: Option<Value>,
}

/// GET /api/settings - every setting as `{key: value}`
pub async fn settings_get() -> ApiResult<Map<String, Value>> {
    let settings = SettingsService::new().await?.all().await?;
    Ok(ApiResponse::success(settings))
}

/// PUT /api/settings `{key, value}`
pub async fn settings_put(JsonBody(request): JsonBody<UpdateSettingRequest>) -> ApiResult<SystemSetting> {
    let value = request
        .value
        .ok_or_else(|| ApiError::invalid_field("value", "Value is required"))?;

    let setting = SettingsService::new().await?.update(&request.key, value).await?;
    Ok(ApiResponse::success(setting))
}
