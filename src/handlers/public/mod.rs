// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition, self-registration and the health probe.
pub mod auth;
pub mod health;
