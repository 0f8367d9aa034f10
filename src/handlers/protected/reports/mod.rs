// handlers/protected/reports/mod.rs - Report handlers
//
// GET    /api/reports                              list (role-scoped)
// POST   /api/reports                              create
// GET    /api/reports/:id                          detail
// PUT    /api/reports/:id                          update metadata
// DELETE /api/reports/:id                          delete
// POST   /api/reports/:id/{submit,approve,reject}  workflow
// POST   /api/reports/:id/comments                 add comment
// GET    /api/reports/:id/export                   JSON download
// PUT    /api/reports/:id/steps                    save wizard step
// GET    /api/reports/:id/completion               completion summary
// POST   /api/reports/:id/steps/signal_tests/generate

pub mod comments;
pub mod export;
pub mod record;
pub mod steps;
pub mod workflow;

pub use comments::comment_post;
pub use export::export_get;
pub use record::{report_delete, report_get, report_list, report_post, report_put};
pub use steps::{completion_get, signals_generate, step_put};
pub use workflow::{approve_post, reject_post, submit_post};
