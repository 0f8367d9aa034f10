use axum::Extension;
use serde_json::{json, Value};

use crate::auth::{generate_jwt, Claims};
use crate::config;
use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::UserService;

/// GET /api/auth/me - profile of the current user
pub async fn me(Extension(user): Extension<ValidatedUser>) -> ApiResult<User> {
    let user = UserService::new().await?.get(user.id).await?;
    Ok(ApiResponse::success(user))
}

/// POST /api/auth/refresh - new token carrying the user's current role
pub async fn refresh(Extension(user): Extension<ValidatedUser>) -> ApiResult<Value> {
    let token = generate_jwt(&Claims::new(user.id, user.role))?;
    Ok(ApiResponse::success(json!({
        "token": token,
        "expiresIn": config::config().security.jwt_expiry_hours * 3600,
        "user": user,
    })))
}

/// POST /api/auth/logout
///
/// Tokens are stateless; the client discards its copy. The request is still
/// recorded in the audit log.
pub async fn logout(Extension(user): Extension<ValidatedUser>) -> ApiResult<Value> {
    tracing::info!("User logged out: {}", user.email);
    Ok(ApiResponse::success(json!({ "message": "Logged out successfully" })))
}
