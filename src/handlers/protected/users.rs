// handlers/protected/users.rs - GET /api/users/by-role/:role
//
// Assignment pickers need the list of approvers, so this one users route is
// open to every signed-in role.

use crate::error::ApiError;
use crate::middleware::{ApiPath, ApiResponse, ApiResult};
use crate::services::user_service::{Assignee, UserService};
use crate::types::Role;

pub async fn by_role(ApiPath(role): ApiPath<String>) -> ApiResult<Vec<Assignee>> {
    let role: Role = role
        .parse()
        .map_err(|_| ApiError::bad_request("Role must be TECHNICAL_MANAGER or PROJECT_MANAGER"))?;

    let users = UserService::new().await?.by_role(role).await?;
    Ok(ApiResponse::success(users))
}
