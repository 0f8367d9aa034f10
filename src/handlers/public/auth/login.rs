// handlers/public/auth/login.rs - POST /api/auth/login handler

use axum::{response::IntoResponse, Extension};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuditContext, JsonBody, ValidatedUser};
use crate::services::UserService;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Exchange credentials for an access token.
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "token": "eyJhbGciOiJIUzI1NiI...",
///     "expiresIn": 86400,
///     "user": { "id": "...", "email": "engineer@test.com", "fullName": "Test Engineer", "role": "ENGINEER" }
///   }
/// }
/// ```
pub async fn login_post(JsonBody(request): JsonBody<LoginRequest>) -> Result<impl IntoResponse, ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::validation_error("Email and password are required", None));
    }

    let user = UserService::new()
        .await?
        .authenticate(&request.email, &request.password)
        .await?;

    let token = generate_jwt(&Claims::new(user.id, user.role))?;
    let expires_in = config::config().security.jwt_expiry_hours * 3600;

    tracing::info!("User logged in: {} ({})", user.email, user.role);

    let context = AuditContext {
        user_id: Some(user.id),
        report_id: None,
    };
    Ok((
        Extension(context),
        ApiResponse::success(json!({
            "token": token,
            "expiresIn": expires_in,
            "user": ValidatedUser::from(user),
        })),
    ))
}
