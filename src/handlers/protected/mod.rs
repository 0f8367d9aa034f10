// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every route here runs behind jwt_auth_middleware and validate_user_middleware,
// so handlers receive the current user as Extension<ValidatedUser>.
pub mod auth;
pub mod files;
pub mod reports;
pub mod users;
