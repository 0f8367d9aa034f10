//! Audit trail for state-changing requests
//!
//! Layered inside authentication so the validated user is visible. Only
//! successful responses are recorded, and writing the entry never affects
//! the response the client receives.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use uuid::Uuid;

use super::validate_user::ValidatedUser;
use crate::config;
use crate::error::ApiError;
use crate::services::audit_service::{AuditService, NewAuditEntry};

/// Keys removed from recorded request bodies, at any depth
const REDACTED_KEYS: [&str; 3] = ["password", "signatureData", "token"];

/// Largest request body copied into an audit entry; the handler always gets all of it
const MAX_AUDITED_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    Logout,
    ReportCreate,
    ReportUpdate,
    ReportDelete,
    ReportStepSave,
    ReportSubmit,
    ReportApprove,
    ReportReject,
    ReportExport,
    CommentCreate,
    SignatureCreate,
    UserCreate,
    UserApprove,
    UserUpdate,
    UserDelete,
    SettingsUpdate,
    FileUpload,
    FileDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::ReportCreate => "report_create",
            AuditAction::ReportUpdate => "report_update",
            AuditAction::ReportDelete => "report_delete",
            AuditAction::ReportStepSave => "report_step_save",
            AuditAction::ReportSubmit => "report_submit",
            AuditAction::ReportApprove => "report_approve",
            AuditAction::ReportReject => "report_reject",
            AuditAction::ReportExport => "report_export",
            AuditAction::CommentCreate => "comment_create",
            AuditAction::SignatureCreate => "signature_create",
            AuditAction::UserCreate => "user_create",
            AuditAction::UserApprove => "user_approve",
            AuditAction::UserUpdate => "user_update",
            AuditAction::UserDelete => "user_delete",
            AuditAction::SettingsUpdate => "settings_update",
            AuditAction::FileUpload => "file_upload",
            AuditAction::FileDelete => "file_delete",
        }
    }

    /// Map a request to the action it performs, if it is audited
    pub fn classify(method: &Method, path: &str) -> Option<AuditAction> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        let action = match (method, segments.as_slice()) {
            (&Method::POST, ["api", "auth", "login"]) => AuditAction::Login,
            (&Method::POST, ["api", "auth", "logout"]) => AuditAction::Logout,

            (&Method::POST, ["api", "reports"]) => AuditAction::ReportCreate,
            (&Method::PUT, ["api", "reports", _]) => AuditAction::ReportUpdate,
            (&Method::DELETE, ["api", "reports", _]) => AuditAction::ReportDelete,
            (&Method::PUT, ["api", "reports", _, "steps"]) => AuditAction::ReportStepSave,
            (&Method::POST, ["api", "reports", _, "steps", _, "generate"]) => AuditAction::ReportStepSave,
            (&Method::POST, ["api", "reports", _, "submit"]) => AuditAction::ReportSubmit,
            (&Method::POST, ["api", "reports", _, "approve"]) => AuditAction::ReportApprove,
            (&Method::POST, ["api", "reports", _, "reject"]) => AuditAction::ReportReject,
            (&Method::GET, ["api", "reports", _, "export"]) => AuditAction::ReportExport,
            (&Method::POST, ["api", "reports", _, "comments"]) => AuditAction::CommentCreate,

            (&Method::POST, ["api", "users"]) => AuditAction::UserCreate,
            (&Method::POST, ["api", "users", _, "approve"]) => AuditAction::UserApprove,
            (&Method::PUT, ["api", "users", _]) => AuditAction::UserUpdate,
            (&Method::DELETE, ["api", "users", _]) => AuditAction::UserDelete,

            (&Method::PUT, ["api", "settings"]) => AuditAction::SettingsUpdate,

            (&Method::POST, ["api", "files", "upload"]) => AuditAction::FileUpload,
            (&Method::DELETE, ["api", "files", _]) => AuditAction::FileDelete,

            _ => return None,
        };
        Some(action)
    }

    /// Submitting and approving also sign the report
    fn signs(&self) -> bool {
        matches!(self, AuditAction::ReportSubmit | AuditAction::ReportApprove)
    }
}

/// Attribution a handler attaches to its response when the request alone
/// does not identify the user or report (login, report creation)
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditContext {
    pub user_id: Option<Uuid>,
    pub report_id: Option<Uuid>,
}

/// Report id from `/api/reports/:id/...`
pub fn report_id_from_path(path: &str) -> Option<Uuid> {
    let mut segments = path.trim_matches('/').split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some("api"), Some("reports"), Some(id)) => Uuid::parse_str(id).ok(),
        _ => None,
    }
}

/// Remove credentials and signature images from a recorded body
pub fn sanitize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in REDACTED_KEYS {
                map.remove(key);
            }
            map.values_mut().for_each(sanitize);
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize),
        _ => {}
    }
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
            .filter(|v| !v.is_empty())
    };

    header_value("x-forwarded-for")
        .or_else(|| header_value("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

/// What gets recorded for a request body. Oversized bodies are summarised.
fn recorded_body(bytes: &[u8]) -> Option<Value> {
    if bytes.len() > MAX_AUDITED_BODY_BYTES {
        return Some(json!({ "omitted": true, "sizeBytes": bytes.len() }));
    }
    serde_json::from_slice::<Value>(bytes).ok().map(|mut v| {
        sanitize(&mut v);
        v
    })
}

/// Request facts captured before the handler runs
#[derive(Debug, Clone)]
struct PendingEntry {
    action: AuditAction,
    method: Method,
    path: String,
    user_agent: Option<String>,
    user_id: Option<Uuid>,
    ip_address: Option<String>,
    body: Option<Value>,
}

impl PendingEntry {
    /// Entries to write for a finished request; none unless it succeeded
    fn complete(self, response: &Response) -> Vec<NewAuditEntry> {
        if !response.status().is_success() {
            return Vec::new();
        }
        let context = response.extensions().get::<AuditContext>().copied().unwrap_or_default();

        let mut details = Map::new();
        details.insert("method".into(), json!(self.method.as_str()));
        details.insert("path".into(), json!(self.path));
        if let Some(agent) = self.user_agent {
            details.insert("userAgent".into(), json!(agent));
        }
        if let Some(body) = self.body {
            details.insert("body".into(), body);
        }

        // A deleted report can no longer be referenced by the row
        let mut report_id = report_id_from_path(&self.path).or(context.report_id);
        if self.action == AuditAction::ReportDelete {
            if let Some(id) = report_id.take() {
                details.insert("reportId".into(), json!(id));
            }
        }

        let entry = NewAuditEntry {
            user_id: self.user_id.or(context.user_id),
            report_id,
            action: self.action.as_str().to_string(),
            details: Value::Object(details),
            ip_address: self.ip_address,
        };

        let mut entries = vec![entry.clone()];
        if self.action.signs() {
            entries.push(NewAuditEntry {
                action: AuditAction::SignatureCreate.as_str().to_string(),
                ..entry
            });
        }
        entries
    }
}

async fn write_entries(entries: Vec<NewAuditEntry>) {
    let service = match AuditService::new().await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Audit log unavailable: {}", e);
            return;
        }
    };
    for entry in entries {
        if let Err(e) = service.record(entry).await {
            tracing::error!("Failed to write audit entry: {}", e);
        }
    }
}

pub async fn audit_middleware(request: Request, next: Next) -> Response {
    if !config::config().security.enable_audit_logging {
        return next.run(request).await;
    }

    audit_with(request, next, |entries| {
        tokio::spawn(write_entries(entries));
    })
    .await
}

/// Run the request and hand the resulting entries to `record`
async fn audit_with<F>(request: Request, next: Next, record: F) -> Response
where
    F: FnOnce(Vec<NewAuditEntry>) + Send,
{
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let Some(action) = AuditAction::classify(&method, &path) else {
        return next.run(request).await;
    };

    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let json_body = is_json(headers);
    let mut pending = PendingEntry {
        action,
        method,
        path,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        user_id: request.extensions().get::<ValidatedUser>().map(|u| u.id),
        ip_address: client_ip(headers, peer),
        body: None,
    };

    // JSON bodies are buffered whole so they can be recorded and still reach the handler
    let request = if json_body {
        let (parts, body) = request.into_parts();
        let bytes = match to_bytes(body, config::config().api.max_request_size_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Failed to buffer request body: {}", e);
                return ApiError::payload_too_large("Request body could not be read within the size limit")
                    .into_response();
            }
        };
        pending.body = recorded_body(&bytes);
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };

    let response = next.run(request).await;
    let entries = pending.complete(&response);
    if !entries.is_empty() {
        record(entries);
    }
    response
}
