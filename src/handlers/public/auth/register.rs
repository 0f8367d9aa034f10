// handlers/public/auth/register.rs - POST /api/auth/register handler

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::UserService;
use crate::types::Role;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub role: String,
}

/// Self-registration. The account stays PENDING until an admin approves it
/// and sets a password.
pub async fn register_post(JsonBody(request): JsonBody<RegisterRequest>) -> ApiResult<Value> {
    let role: Role = request
        .role
        .parse()
        .map_err(|_| ApiError::invalid_field("role", "Role must be ENGINEER, TECHNICAL_MANAGER or PROJECT_MANAGER"))?;

    let user = UserService::new()
        .await?
        .register(&request.email, &request.full_name, role)
        .await?;

    Ok(ApiResponse::created(json!({
        "message": "Registration successful! Your account is now pending admin approval.",
        "user": user,
    })))
}
