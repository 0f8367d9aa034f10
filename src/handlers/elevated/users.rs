// handlers/elevated/users.rs - User administration

use axum::Extension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiPath, ApiQuery, ApiResponse, ApiResult, JsonBody, ValidatedUser};
use crate::services::user_service::{UserChanges, UserListItem};
use crate::services::UserService;
use crate::types::{Role, UserStatus};

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub status: Option<UserStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    pub role: Option<Role>,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ApproveUserRequest {
    pub role: Option<Role>,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

/// GET /api/users?status=
pub async fn user_list(ApiQuery(query): ApiQuery<UserListQuery>) -> ApiResult<Vec<UserListItem>> {
    let users = UserService::new().await?.list(query.status).await?;
    Ok(ApiResponse::success(users))
}

/// GET /api/users/pending/count
pub async fn pending_count() -> ApiResult<Value> {
    let count = UserService::new().await?.pending_count().await?;
    Ok(ApiResponse::success(json!({ "count": count })))
}

/// POST /api/users
pub async fn user_post(JsonBody(request): JsonBody<CreateUserRequest>) -> ApiResult<User> {
    let role = request
        .role
        .ok_or_else(|| ApiError::invalid_field("role", "Role is required"))?;

    let user = UserService::new()
        .await?
        .create(&request.email, &request.full_name, role, &request.password)
        .await?;
    Ok(ApiResponse::created(user))
}

/// POST /api/users/:id/approve `{role?, password}`
pub async fn user_approve(
    ApiPath(id): ApiPath<Uuid>,
    JsonBody(request): JsonBody<ApproveUserRequest>,
) -> ApiResult<User> {
    let user = UserService::new()
        .await?
        .approve(id, request.role, &request.password)
        .await?;
    Ok(ApiResponse::success(user))
}

/// PUT /api/users/:id
pub async fn user_put(
    Extension(admin): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    JsonBody(request): JsonBody<UpdateUserRequest>,
) -> ApiResult<User> {
    if id == admin.id && matches!(request.status, Some(s) if s != UserStatus::Active) {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }
    if id == admin.id && matches!(request.role, Some(r) if r != Role::Admin) {
        return Err(ApiError::bad_request("You cannot remove your own admin role"));
    }

    let changes = UserChanges {
        full_name: request.full_name,
        role: request.role,
        status: request.status,
    };
    let user = UserService::new().await?.update(id, changes).await?;
    Ok(ApiResponse::success(user))
}

/// DELETE /api/users/:id
pub async fn user_delete(
    Extension(admin): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Value> {
    let user = UserService::new().await?.delete(id, admin.id).await?;
    Ok(ApiResponse::success(json!({
        "id": user.id,
        "message": "User deleted successfully",
    })))
}
