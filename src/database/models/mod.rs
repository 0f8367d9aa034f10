pub mod audit;
pub mod file;
pub mod report;
pub mod setting;
pub mod user;

pub use audit::AuditLog;
pub use file::ReportFile;
pub use report::{Comment, Report, ReportStep, Signature};
pub use setting::SystemSetting;
pub use user::{User, UserSummary};
