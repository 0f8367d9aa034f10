use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::AuditLog;
use crate::error::ApiError;
use crate::types::Role;

const MAX_STATS_DAYS: i64 = 365;

/// One entry to write
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: Option<Uuid>,
    pub report_id: Option<Uuid>,
    pub action: String,
    pub details: Value,
    pub ip_address: Option<String>,
}

/// Query string of `GET /api/audit`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub action: Option<String>,
    pub user_id: Option<Uuid>,
    pub report_id: Option<Uuid>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditUser {
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub title: String,
    pub document_ref: String,
    pub revision: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLogView {
    #[serde(flatten)]
    pub log: AuditLog,
    pub user: Option<AuditUser>,
    pub report: Option<AuditReport>,
}

#[derive(Debug, FromRow)]
struct AuditLogRow {
    #[sqlx(flatten)]
    log: AuditLog,
    user_full_name: Option<String>,
    user_email: Option<String>,
    user_role: Option<Role>,
    report_title: Option<String>,
    report_document_ref: Option<String>,
    report_revision: Option<String>,
}

impl From<AuditLogRow> for AuditLogView {
    fn from(row: AuditLogRow) -> Self {
        let user = match (row.user_full_name, row.user_email, row.user_role) {
            (Some(full_name), Some(email), Some(role)) => Some(AuditUser { full_name, email, role }),
            _ => None,
        };
        let report = match (row.report_title, row.report_document_ref, row.report_revision) {
            (Some(title), Some(document_ref), Some(revision)) => Some(AuditReport {
                title,
                document_ref,
                revision,
            }),
            _ => None,
        };
        Self { log: row.log, user, report }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub pages: i64,
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    fn new(total: i64, page: i64, limit: i64) -> Self {
        let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self { total, pages, page, limit }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub logs: Vec<AuditLogView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActionCount {
    pub action: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub days: i64,
    pub since: DateTime<Utc>,
    pub total: i64,
    pub actions: Vec<ActionCount>,
    pub top_users: Vec<UserActivity>,
}

/// Resolved filters with the page window
#[derive(Debug, Clone, PartialEq)]
struct AuditFilter {
    action: Option<String>,
    user_id: Option<Uuid>,
    report_id: Option<Uuid>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    page: i64,
    limit: i64,
}

impl AuditFilter {
    fn from_query(query: AuditQuery, default_limit: i64, max_limit: i64) -> Result<Self, ApiError> {
        let start = query
            .start_date
            .as_deref()
            .map(|raw| parse_bound(raw, "startDate", false))
            .transpose()?;
        let end = query
            .end_date
            .as_deref()
            .map(|raw| parse_bound(raw, "endDate", true))
            .transpose()?;

        Ok(Self {
            action: query.action.filter(|a| !a.trim().is_empty()),
            user_id: query.user_id,
            report_id: query.report_id,
            start,
            end,
            page: query.page.unwrap_or(1).max(1),
            limit: query.limit.unwrap_or(default_limit).clamp(1, max_limit.max(1)),
        })
    }

    fn push_where(&self, query: &mut QueryBuilder<'_, Postgres>) {
        query.push(" WHERE TRUE");
        if let Some(action) = &self.action {
            query.push(" AND a.action = ").push_bind(action.clone());
        }
        if let Some(user_id) = self.user_id {
            query.push(" AND a.user_id = ").push_bind(user_id);
        }
        if let Some(report_id) = self.report_id {
            query.push(" AND a.report_id = ").push_bind(report_id);
        }
        if let Some(start) = self.start {
            query.push(" AND a.created_at >= ").push_bind(start);
        }
        if let Some(end) = self.end {
            query.push(" AND a.created_at < ").push_bind(end);
        }
    }
}

/// RFC 3339 timestamps are taken as-is. A bare `YYYY-MM-DD` covers the whole
/// day, so an end date becomes the following midnight.
fn parse_bound(raw: &str, field: &str, end_of_range: bool) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::invalid_field(field, "Expected a date (YYYY-MM-DD) or RFC 3339 timestamp"))?;
    let midnight = date.and_time(NaiveTime::MIN).and_utc();
    Ok(if end_of_range { midnight + Duration::days(1) } else { midnight })
}

pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub async fn new() -> Result<Self, ApiError> {
        let pool = DatabaseManager::pool().await?;
        Ok(Self { pool })
    }

    pub async fn record(&self, entry: NewAuditEntry) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO audit_logs (id, user_id, report_id, action, details, ip_address)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.report_id)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self, query: AuditQuery) -> Result<AuditPage, ApiError> {
        let api = &config::config().api;
        let filter = AuditFilter::from_query(query, api.default_page_size, api.max_page_size)?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs a");
        filter.push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT a.id, a.user_id, a.report_id, a.action, a.details, a.ip_address, a.created_at,
                    u.full_name AS user_full_name, u.email AS user_email, u.role AS user_role,
                    r.title AS report_title, r.document_ref AS report_document_ref,
                    r.revision AS report_revision
             FROM audit_logs a
             LEFT JOIN users u ON u.id = a.user_id
             LEFT JOIN reports r ON r.id = a.report_id",
        );
        filter.push_where(&mut select);
        select
            .push(" ORDER BY a.created_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind((filter.page - 1) * filter.limit);

        let rows = select.build_query_as::<AuditLogRow>().fetch_all(&self.pool).await?;

        Ok(AuditPage {
            logs: rows.into_iter().map(AuditLogView::from).collect(),
            pagination: Pagination::new(total, filter.page, filter.limit),
        })
    }

    /// Action counts and the five busiest users over the last `days` days
    pub async fn stats(&self, days: Option<i64>) -> Result<AuditStats, ApiError> {
        let days = days.unwrap_or(30).clamp(1, MAX_STATS_DAYS);
        let since = Utc::now() - Duration::days(days);

        let actions_query = sqlx::query_as::<_, ActionCount>(
            "SELECT action, COUNT(*) AS count FROM audit_logs
             WHERE created_at >= $1
             GROUP BY action
             ORDER BY count DESC, action",
        )
        .bind(since)
        .fetch_all(&self.pool);

        let users_query = sqlx::query_as::<_, UserActivity>(
            "SELECT u.id AS user_id, u.full_name, u.email, COUNT(*) AS count
             FROM audit_logs a
             JOIN users u ON u.id = a.user_id
             WHERE a.created_at >= $1
             GROUP BY u.id, u.full_name, u.email
             ORDER BY count DESC, u.full_name
             LIMIT 5",
        )
        .bind(since)
        .fetch_all(&self.pool);

        let (actions, top_users) = futures::try_join!(actions_query, users_query)?;
        let total = actions.iter().map(|a| a.count).sum();

        Ok(AuditStats {
            days,
            since,
            total,
            actions,
            top_users,
        })
    }
}
