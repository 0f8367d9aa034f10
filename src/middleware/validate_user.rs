use axum::{extract::Request, middleware::Next, response::Response};
use serde::Serialize;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::database::models::User;
use crate::error::ApiError;
use crate::services::UserService;
use crate::types::Role;
use crate::workflow::Actor;

/// The current user as stored, confirmed ACTIVE for this request. Also the
/// user payload returned on login.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

impl ValidatedUser {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<User> for ValidatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
        }
    }
}

/// Re-check the token's user against the database. Deleted or deactivated
/// accounts lose access immediately, and a role change takes effect without
/// a new token.
pub async fn validate_user_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = *request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("Access token required"))?;

    let user = UserService::new()
        .await?
        .find_by_id(auth_user.user_id)
        .await?
        .filter(User::is_active)
        .ok_or_else(|| {
            tracing::warn!("Token presented for missing or inactive user {}", auth_user.user_id);
            ApiError::unauthorized("User not found or inactive")
        })?;

    let validated = ValidatedUser::from(user);
    tracing::debug!("Request by {} ({})", validated.email, validated.role);

    request.extensions_mut().insert(validated);
    Ok(next.run(request).await)
}

/// Admin-only routes. Runs after `validate_user_middleware`.
pub async fn require_admin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = request
        .extensions()
        .get::<ValidatedUser>()
        .map(ValidatedUser::is_admin)
        .unwrap_or(false);

    if !is_admin {
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(next.run(request).await)
}
