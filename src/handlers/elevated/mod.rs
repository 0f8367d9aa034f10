// handlers/elevated/mod.rs - Administrative handlers (ADMIN role required)
//
// Mounted behind require_admin_middleware in addition to the protected tier.
pub mod audit;
pub mod settings;
pub mod users;
