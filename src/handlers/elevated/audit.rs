// handlers/elevated/audit.rs - Audit log queries

use serde::Deserialize;

use crate::middleware::{ApiQuery, ApiResponse, ApiResult};
use crate::services::audit_service::{AuditPage, AuditQuery, AuditStats};
use crate::services::AuditService;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub days: Option<i64>,
}

/// GET /api/audit?action=&userId=&reportId=&startDate=&endDate=&page=&limit=
pub async fn audit_list(ApiQuery(query): ApiQuery<AuditQuery>) -> ApiResult<AuditPage> {
    let page = AuditService::new().await?.list(query).await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/audit/stats?days=30
pub async fn audit_stats(ApiQuery(query): ApiQuery<StatsQuery>) -> ApiResult<AuditStats> {
    let stats = AuditService::new().await?.stats(query.days).await?;
    Ok(ApiResponse::success(stats))
}
