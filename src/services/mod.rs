pub mod audit_service;
pub mod file_service;
pub mod report_service;
pub mod settings_service;
pub mod user_service;

pub use audit_service::AuditService;
pub use file_service::FileService;
pub use report_service::ReportService;
pub use settings_service::SettingsService;
pub use user_service::UserService;
