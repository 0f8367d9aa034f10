pub mod audit;
pub mod auth;
pub mod response;
pub mod validate_user;

pub use audit::{audit_middleware, AuditAction, AuditContext};
pub use auth::{jwt_auth_middleware, AuthUser};
pub use response::{ApiPath, ApiQuery, ApiResponse, ApiResult, JsonBody};
pub use validate_user::{require_admin_middleware, validate_user_middleware, ValidatedUser};
