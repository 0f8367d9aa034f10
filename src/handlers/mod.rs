// handlers/mod.rs - 3-tier handler layout
//
// Public (no auth) → Protected (JWT + active user) → Elevated (ADMIN role)
pub mod elevated;
pub mod protected;
pub mod public;
