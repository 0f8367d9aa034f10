// handlers/protected/auth/mod.rs - Session management for authenticated users

pub mod session;

pub use session::{logout, me, refresh};
