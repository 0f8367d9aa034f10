use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::{ReportStatus, Role};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub title: String,
    pub project_ref: String,
    pub document_ref: String,
    pub revision: String,
    pub report_type: String,
    pub status: ReportStatus,
    pub creator_id: Uuid,
    pub tm_id: Option<Uuid>,
    pub pm_id: Option<Uuid>,
    pub storage_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Creator, assigned TM or assigned PM
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id || self.tm_id == Some(user_id) || self.pm_id == Some(user_id)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReportStep {
    pub id: Uuid,
    pub report_id: Uuid,
    pub step_name: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub id: Uuid,
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub signature_data: Option<String>,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
