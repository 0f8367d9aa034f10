use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::manager::DatabaseManager;
use crate::database::models::{Comment, Report, ReportFile, ReportStep, Signature, UserSummary};
use crate::error::{ApiError, FieldErrors};
use crate::services::{FileService, SettingsService, UserService};
use crate::steps::completion::{self, CompletionReport};
use crate::steps::signals::{self, SignalTests};
use crate::steps::{schema, StepError, StepName};
use crate::types::{ReportStatus, Role};
use crate::workflow::{self, Actor, WorkflowAction};

const REPORT_COLUMNS: &str = "id, title, project_ref, document_ref, revision, report_type, status, \
     creator_id, tm_id, pm_id, storage_location, created_at, updated_at, submitted_at, completed_at";

const STEP_COLUMNS: &str = "id, report_id, step_name, data, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub project_ref: String,
    #[serde(default)]
    pub document_ref: String,
    #[serde(default)]
    pub revision: String,
    pub tm_id: Option<Uuid>,
    pub pm_id: Option<Uuid>,
}

/// Metadata edits. For `tmId`/`pmId`, an explicit `null` clears the assignment
/// while an absent key leaves it alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportChanges {
    pub title: Option<String>,
    pub project_ref: Option<String>,
    pub document_ref: Option<String>,
    pub revision: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub tm_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "present")]
    pub pm_id: Option<Option<Uuid>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Extra input carried by submit / approve / reject
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionInput {
    pub signature_data: Option<String>,
    pub reason: Option<String>,
    pub storage_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReportCounts {
    pub comments: i64,
    pub files: i64,
}

#[derive(Debug, FromRow)]
struct ReportWithCountsRow {
    #[sqlx(flatten)]
    report: Report,
    #[sqlx(flatten)]
    counts: ReportCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListItem {
    #[serde(flatten)]
    pub report: Report,
    pub creator: Option<UserSummary>,
    pub technical_manager: Option<UserSummary>,
    pub project_manager: Option<UserSummary>,
    pub signatures: Vec<Signature>,
    #[serde(rename = "_count")]
    pub count: ReportCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureView {
    #[serde(flatten)]
    pub signature: Signature,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub creator: Option<UserSummary>,
    pub technical_manager: Option<UserSummary>,
    pub project_manager: Option<UserSummary>,
    /// Wizard order
    pub steps: Vec<ReportStep>,
    pub signatures: Vec<SignatureView>,
    pub comments: Vec<CommentView>,
    pub files: Vec<ReportFile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportExport {
    pub exported_at: DateTime<Utc>,
    pub exported_by: Uuid,
    pub report: ReportDetail,
}

impl ReportExport {
    /// Download name, e.g. `SAT_DOC-001_Rev1.0.json`
    pub fn filename(&self) -> String {
        let safe = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') { c } else { '_' })
                .collect()
        };
        format!(
            "SAT_{}_Rev{}.json",
            safe(&self.report.report.document_ref),
            safe(&self.report.report.revision)
        )
    }
}

fn require_text(errors: &mut FieldErrors, field: &str, value: &str, label: &str) {
    if value.trim().is_empty() {
        errors.insert(field.to_string(), format!("{} is required", label));
    }
}

/// `%term%` for ILIKE with the wildcard characters in `term` escaped
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Order stored steps by their wizard position; unknown names sort last
fn wizard_order(steps: &mut [ReportStep]) {
    steps.sort_by_key(|s| {
        s.step_name
            .parse::<StepName>()
            .map(|n| n.position())
            .unwrap_or(StepName::ALL.len())
    });
}

/// Report fields that a saved `document_info` step carries
#[derive(Debug, Default, PartialEq)]
struct DocumentInfoSync {
    title: Option<String>,
    project_ref: Option<String>,
    document_ref: Option<String>,
    revision: Option<String>,
    tm_id: Option<Uuid>,
    pm_id: Option<Uuid>,
}

impl DocumentInfoSync {
    fn from_step(data: &Value) -> Result<Self, ApiError> {
        let text = |key: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let id = |key: &'static str| -> Result<Option<Uuid>, ApiError> {
            match text(key) {
                Some(raw) => Uuid::parse_str(&raw)
                    .map(Some)
                    .map_err(|_| ApiError::invalid_field(key, "Must be a valid user id")),
                None => Ok(None),
            }
        };

        Ok(Self {
            title: text("title"),
            project_ref: text("projectRef"),
            document_ref: text("documentRef"),
            revision: text("revision"),
            tm_id: id("tmId")?,
            pm_id: id("pmId")?,
        })
    }
}

pub struct ReportService {
    pool: PgPool,
}

impl ReportService {
    pub async fn new() -> Result<Self, ApiError> {
        let pool = DatabaseManager::pool().await?;
        Ok(Self { pool })
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>, ApiError> {
        let report = sqlx::query_as::<_, Report>(&format!("SELECT {} FROM reports WHERE id = $1", REPORT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(report)
    }

    pub async fn get(&self, id: Uuid) -> Result<Report, ApiError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Report not found"))
    }

    pub async fn find_by_document(&self, document_ref: &str, revision: &str) -> Result<Option<Report>, ApiError> {
        let report = sqlx::query_as::<_, Report>(&format!(
            "SELECT {} FROM reports WHERE document_ref = $1 AND revision = $2",
            REPORT_COLUMNS
        ))
        .bind(document_ref.trim())
        .bind(revision.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(report)
    }

    /// Report visible to admins and participants
    pub async fn get_for_view(&self, id: Uuid, actor: Actor) -> Result<Report, ApiError> {
        let report = self.get(id).await?;
        if actor.role != Role::Admin && !report.is_participant(actor.id) {
            return Err(ApiError::forbidden("You do not have access to this report"));
        }
        Ok(report)
    }

    /// Report the actor may change right now
    pub async fn get_for_edit(&self, id: Uuid, actor: Actor) -> Result<Report, ApiError> {
        let report = self.get(id).await?;
        check_editable(&report, actor)?;
        Ok(report)
    }

    pub async fn list(&self, actor: Actor, filter: ReportFilter) -> Result<Vec<ReportListItem>, ApiError> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {},
                (SELECT COUNT(*) FROM comments c WHERE c.report_id = reports.id) AS comments,
                (SELECT COUNT(*) FROM report_files f WHERE f.report_id = reports.id) AS files
             FROM reports WHERE TRUE",
            REPORT_COLUMNS
        ));

        match actor.role {
            Role::Engineer => {
                query.push(" AND creator_id = ").push_bind(actor.id);
            }
            Role::TechnicalManager => {
                query.push(" AND tm_id = ").push_bind(actor.id);
            }
            Role::ProjectManager => {
                query.push(" AND pm_id = ").push_bind(actor.id);
            }
            Role::Admin => {}
        }

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }

        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = like_pattern(term);
            query
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR project_ref ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR document_ref ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        query.push(" ORDER BY updated_at DESC");

        let rows = query
            .build_query_as::<ReportWithCountsRow>()
            .fetch_all(&self.pool)
            .await?;

        let report_ids: Vec<Uuid> = rows.iter().map(|r| r.report.id).collect();
        let user_ids = participant_ids(rows.iter().map(|r| &r.report));

        let users = UserService::new().await?;
        let (summaries, signatures) =
            futures::try_join!(users.summaries(&user_ids), self.signatures_for(&report_ids))?;
        let summaries = index_summaries(summaries);

        let mut signatures_by_report: HashMap<Uuid, Vec<Signature>> = HashMap::new();
        for signature in signatures {
            signatures_by_report.entry(signature.report_id).or_default().push(signature);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let report = row.report;
                ReportListItem {
                    creator: summaries.get(&report.creator_id).cloned(),
                    technical_manager: report.tm_id.and_then(|id| summaries.get(&id).cloned()),
                    project_manager: report.pm_id.and_then(|id| summaries.get(&id).cloned()),
                    signatures: signatures_by_report.remove(&report.id).unwrap_or_default(),
                    count: row.counts,
                    report,
                }
            })
            .collect())
    }

    /// Full report with steps, signatures, comments and files
    pub async fn detail(&self, id: Uuid, actor: Actor) -> Result<ReportDetail, ApiError> {
        let report = self.get_for_view(id, actor).await?;
        self.assemble(report).await
    }

    pub async fn export(&self, id: Uuid, actor: Actor) -> Result<ReportExport, ApiError> {
        let report = self.detail(id, actor).await?;
        Ok(ReportExport {
            exported_at: Utc::now(),
            exported_by: actor.id,
            report,
        })
    }

    async fn assemble(&self, report: Report) -> Result<ReportDetail, ApiError> {
        let id = report.id;
        let (mut steps, signatures, comments, files) = futures::try_join!(
            self.steps_for(id),
            self.signatures_for(std::slice::from_ref(&id)),
            self.comments_for(id),
            self.files_for(id),
        )?;
        wizard_order(&mut steps);

        let mut user_ids = participant_ids(std::iter::once(&report));
        user_ids.extend(signatures.iter().map(|s| s.user_id));
        user_ids.extend(comments.iter().map(|c| c.user_id));
        user_ids.sort();
        user_ids.dedup();

        let summaries = index_summaries(UserService::new().await?.summaries(&user_ids).await?);

        Ok(ReportDetail {
            creator: summaries.get(&report.creator_id).cloned(),
            technical_manager: report.tm_id.and_then(|id| summaries.get(&id).cloned()),
            project_manager: report.pm_id.and_then(|id| summaries.get(&id).cloned()),
            steps,
            signatures: signatures
                .into_iter()
                .map(|signature| SignatureView {
                    user: summaries.get(&signature.user_id).cloned(),
                    signature,
                })
                .collect(),
            comments: comments
                .into_iter()
                .map(|comment| CommentView {
                    user: summaries.get(&comment.user_id).cloned(),
                    comment,
                })
                .collect(),
            files,
            report,
        })
    }

    pub async fn create(&self, actor: Actor, input: NewReport) -> Result<Report, ApiError> {
        if actor.role != Role::Engineer {
            return Err(ApiError::forbidden("Only engineers can create reports"));
        }

        let mut errors = FieldErrors::new();
        require_text(&mut errors, "title", &input.title, "Title");
        require_text(&mut errors, "projectRef", &input.project_ref, "Project reference");
        require_text(&mut errors, "documentRef", &input.document_ref, "Document reference");
        require_text(&mut errors, "revision", &input.revision, "Revision");
        if !errors.is_empty() {
            return Err(ApiError::validation_error("Missing required fields", Some(errors)));
        }

        self.check_assignees(input.tm_id, input.pm_id).await?;

        let report = sqlx::query_as::<_, Report>(&format!(
            "INSERT INTO reports (id, title, project_ref, document_ref, revision, creator_id, tm_id, pm_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.title.trim())
        .bind(input.project_ref.trim())
        .bind(input.document_ref.trim())
        .bind(input.revision.trim())
        .bind(actor.id)
        .bind(input.tm_id)
        .bind(input.pm_id)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_document)?;

        tracing::info!(
            "Report created: {} rev {} ({}) by {}",
            report.document_ref,
            report.revision,
            report.id,
            actor.id
        );
        Ok(report)
    }

    pub async fn update(&self, id: Uuid, actor: Actor, changes: ReportChanges) -> Result<Report, ApiError> {
        let current = self.get_for_edit(id, actor).await?;

        let mut errors = FieldErrors::new();
        let mut pick = |field: &str, label: &str, new: Option<String>, old: String| -> String {
            match new {
                Some(value) => {
                    require_text(&mut errors, field, &value, label);
                    value.trim().to_string()
                }
                None => old,
            }
        };
        let title = pick("title", "Title", changes.title, current.title);
        let project_ref = pick("projectRef", "Project reference", changes.project_ref, current.project_ref);
        let document_ref = pick("documentRef", "Document reference", changes.document_ref, current.document_ref);
        let revision = pick("revision", "Revision", changes.revision, current.revision);
        if !errors.is_empty() {
            return Err(ApiError::validation_error("Invalid report fields", Some(errors)));
        }

        let tm_id = changes.tm_id.unwrap_or(current.tm_id);
        let pm_id = changes.pm_id.unwrap_or(current.pm_id);
        self.check_assignees(
            changes.tm_id.flatten().filter(|new| Some(*new) != current.tm_id),
            changes.pm_id.flatten().filter(|new| Some(*new) != current.pm_id),
        )
        .await?;

        let report = sqlx::query_as::<_, Report>(&format!(
            "UPDATE reports
             SET title = $2, project_ref = $3, document_ref = $4, revision = $5,
                 tm_id = $6, pm_id = $7, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(id)
        .bind(title)
        .bind(project_ref)
        .bind(document_ref)
        .bind(revision)
        .bind(tm_id)
        .bind(pm_id)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_document)?;

        Ok(report)
    }

    pub async fn delete(&self, id: Uuid, actor: Actor) -> Result<Report, ApiError> {
        let report = self.get_for_edit(id, actor).await?;

        let stored: Vec<String> = sqlx::query_scalar("SELECT filename FROM report_files WHERE report_id = $1")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        FileService::new().await?.discard_stored(&stored).await;

        tracing::info!("Report deleted: {} ({})", report.document_ref, report.id);
        Ok(report)
    }

    pub async fn add_comment(&self, id: Uuid, actor: Actor, content: &str) -> Result<CommentView, ApiError> {
        self.get_for_view(id, actor).await?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::invalid_field("content", "Comment cannot be empty"));
        }

        let comment = insert_comment(&self.pool, id, actor.id, content).await?;
        let user = UserService::new().await?.find_by_id(actor.id).await?.map(|u| u.summary());
        Ok(CommentView { comment, user })
    }

    /// Apply a workflow action under a row lock.
    ///
    /// Rejections store the reason as a comment; signed steps record a
    /// signature for the role the transition calls for.
    pub async fn transition(
        &self,
        id: Uuid,
        action: WorkflowAction,
        actor: Actor,
        input: TransitionInput,
    ) -> Result<Report, ApiError> {
        let mut tx = self.pool.begin().await?;

        let report = lock_report(&mut tx, id).await?;
        let transition = workflow::plan(&report, action, actor)?;

        let reason = match action {
            WorkflowAction::Reject => Some(workflow::rejection_reason(input.reason.as_deref())?),
            _ => None,
        };

        let storage_location = match input.storage_location.as_deref().map(str::trim) {
            Some(location) if transition.completes() && !location.is_empty() => {
                let allowed = SettingsService::new().await?.storage_locations().await?;
                if !allowed.iter().any(|l| l == location) {
                    return Err(ApiError::invalid_field(
                        "storageLocation",
                        "Storage location must be one of the configured final storage locations",
                    ));
                }
                Some(location.to_string())
            }
            _ => None,
        };

        let updated = sqlx::query_as::<_, Report>(&format!(
            "UPDATE reports
             SET status = $2,
                 updated_at = now(),
                 submitted_at = CASE WHEN $3 THEN now() ELSE submitted_at END,
                 completed_at = CASE WHEN $4 THEN now() ELSE completed_at END,
                 storage_location = COALESCE($5, storage_location)
             WHERE id = $1
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(id)
        .bind(transition.to)
        .bind(action == WorkflowAction::Submit)
        .bind(transition.completes())
        .bind(storage_location)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(role) = transition.signer_role {
            sqlx::query(
                "INSERT INTO signatures (id, report_id, user_id, role, signature_data)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(actor.id)
            .bind(role)
            .bind(input.signature_data.as_deref().filter(|s| !s.is_empty()))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(reason) = reason {
            insert_comment(&mut *tx, id, actor.id, &format!("Rejected: {}", reason)).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Report {} {}: {} -> {} by {}",
            id,
            action.as_str(),
            transition.from,
            transition.to,
            actor.id
        );
        Ok(updated)
    }

    /// Upsert one wizard step after checking its shape
    pub async fn save_step(&self, id: Uuid, actor: Actor, step_name: &str, data: Value) -> Result<ReportStep, ApiError> {
        let step: StepName = step_name.parse()?;
        if !data.is_object() {
            let mut errors = FieldErrors::new();
            errors.insert("data".to_string(), "Step data must be an object".to_string());
            return Err(StepError::Shape(errors).into());
        }
        schema::validate(step, &data)?;

        let sync = match step {
            StepName::DocumentInfo => Some(DocumentInfoSync::from_step(&data)?),
            _ => None,
        };
        if let Some(sync) = &sync {
            self.check_assignees(sync.tm_id, sync.pm_id).await?;
        }

        let mut tx = self.pool.begin().await?;
        let report = lock_report(&mut tx, id).await?;
        check_editable(&report, actor)?;

        let saved = upsert_step(&mut tx, id, step, &data).await?;

        match sync {
            Some(sync) => {
                sqlx::query(
                    "UPDATE reports
                     SET title = COALESCE($2, title),
                         project_ref = COALESCE($3, project_ref),
                         document_ref = COALESCE($4, document_ref),
                         revision = COALESCE($5, revision),
                         tm_id = COALESCE($6, tm_id),
                         pm_id = COALESCE($7, pm_id),
                         updated_at = now()
                     WHERE id = $1",
                )
                .bind(id)
                .bind(sync.title)
                .bind(sync.project_ref)
                .bind(sync.document_ref)
                .bind(sync.revision)
                .bind(sync.tm_id)
                .bind(sync.pm_id)
                .execute(&mut *tx)
                .await
                .map_err(duplicate_document)?;
            }
            None => touch(&mut tx, id).await?,
        }

        tx.commit().await?;

        tracing::debug!("Saved step {} for report {}", step, id);
        Ok(saved)
    }

    pub async fn completion(&self, id: Uuid, actor: Actor) -> Result<CompletionReport, ApiError> {
        let report = self.get_for_view(id, actor).await?;
        let steps: HashMap<StepName, Value> = self
            .steps_for(id)
            .await?
            .into_iter()
            .filter_map(|s| s.step_name.parse::<StepName>().ok().map(|name| (name, s.data)))
            .collect();

        Ok(completion::evaluate(&steps, workflow::submission_issues(&report)))
    }

    /// Rebuild the `signal_tests` step from the saved pre-configuration
    pub async fn generate_signals(&self, id: Uuid, actor: Actor) -> Result<SignalTests, ApiError> {
        let mut tx = self.pool.begin().await?;
        let report = lock_report(&mut tx, id).await?;
        check_editable(&report, actor)?;

        let pre_configuration: Option<Value> = sqlx::query_scalar(
            "SELECT data FROM report_steps WHERE report_id = $1 AND step_name = $2",
        )
        .bind(id)
        .bind(StepName::PreConfiguration.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let pre_configuration = pre_configuration.ok_or(StepError::MissingPreConfiguration)?;
        let generated = signals::generate(&pre_configuration)?;

        let data = serde_json::to_value(&generated)
            .map_err(|e| ApiError::internal_server_error(format!("Failed to encode signal rows: {}", e)))?;
        upsert_step(&mut tx, id, StepName::SignalTests, &data).await?;
        touch(&mut tx, id).await?;

        tx.commit().await?;

        tracing::info!(
            "Generated signal rows for report {}: {} digital, {} analog, {} modbus",
            id,
            generated.digital_signals.len(),
            generated.analog_signals.len(),
            generated.modbus_digital.len() + generated.modbus_analog.len()
        );
        Ok(generated)
    }

    async fn check_assignees(&self, tm_id: Option<Uuid>, pm_id: Option<Uuid>) -> Result<(), ApiError> {
        if tm_id.is_none() && pm_id.is_none() {
            return Ok(());
        }
        let users = UserService::new().await?;
        if let Some(tm_id) = tm_id {
            users.require_assignee(tm_id, Role::TechnicalManager, "tmId").await?;
        }
        if let Some(pm_id) = pm_id {
            users.require_assignee(pm_id, Role::ProjectManager, "pmId").await?;
        }
        Ok(())
    }

    async fn steps_for(&self, id: Uuid) -> Result<Vec<ReportStep>, ApiError> {
        let steps = sqlx::query_as::<_, ReportStep>(&format!(
            "SELECT {} FROM report_steps WHERE report_id = $1",
            STEP_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(steps)
    }

    async fn signatures_for(&self, report_ids: &[Uuid]) -> Result<Vec<Signature>, ApiError> {
        if report_ids.is_empty() {
            return Ok(Vec::new());
        }
        let signatures = sqlx::query_as::<_, Signature>(
            "SELECT id, report_id, user_id, role, signature_data, signed_at
             FROM signatures WHERE report_id = ANY($1)
             ORDER BY signed_at",
        )
        .bind(report_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(signatures)
    }

    async fn comments_for(&self, id: Uuid) -> Result<Vec<Comment>, ApiError> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT id, report_id, user_id, content, created_at
             FROM comments WHERE report_id = $1
             ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn files_for(&self, id: Uuid) -> Result<Vec<ReportFile>, ApiError> {
        let files = sqlx::query_as::<_, ReportFile>(
            "SELECT id, report_id, uploader_id, filename, original_name, mime_type, size_bytes, sha256, created_at
             FROM report_files WHERE report_id = $1
             ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }
}

/// Creator or admin, and only while the report is DRAFT or REJECTED
fn check_editable(report: &Report, actor: Actor) -> Result<(), ApiError> {
    if actor.role != Role::Admin && report.creator_id != actor.id {
        return Err(ApiError::forbidden("Only the report creator can modify this report"));
    }
    if !report.status.is_editable() {
        return Err(ApiError::conflict(format!(
            "Report cannot be modified while {}",
            report.status
        )));
    }
    Ok(())
}

fn participant_ids<'a>(reports: impl Iterator<Item = &'a Report>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = reports
        .flat_map(|r| [Some(r.creator_id), r.tm_id, r.pm_id])
        .flatten()
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

fn index_summaries(summaries: Vec<UserSummary>) -> HashMap<Uuid, UserSummary> {
    summaries.into_iter().map(|s| (s.id, s)).collect()
}

fn duplicate_document(error: sqlx::Error) -> ApiError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::conflict("A report with this Document Reference and Revision already exists.")
        }
        _ => error.into(),
    }
}

async fn lock_report(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Report, ApiError> {
    sqlx::query_as::<_, Report>(&format!(
        "SELECT {} FROM reports WHERE id = $1 FOR UPDATE",
        REPORT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Report not found"))
}

async fn touch(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<(), ApiError> {
    sqlx::query("UPDATE reports SET updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn upsert_step(
    tx: &mut Transaction<'_, Postgres>,
    report_id: Uuid,
    step: StepName,
    data: &Value,
) -> Result<ReportStep, ApiError> {
    let saved = sqlx::query_as::<_, ReportStep>(&format!(
        "INSERT INTO report_steps (id, report_id, step_name, data)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (report_id, step_name)
         DO UPDATE SET data = EXCLUDED.data, updated_at = now()
         RETURNING {}",
        STEP_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(report_id)
    .bind(step.as_str())
    .bind(data)
    .fetch_one(&mut **tx)
    .await?;
    Ok(saved)
}

async fn insert_comment<'e, E>(executor: E, report_id: Uuid, user_id: Uuid, content: &str) -> Result<Comment, ApiError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let comment = sqlx::query_as::<_, Comment>(
        "INSERT INTO comments (id, report_id, user_id, content)
         VALUES ($1, $2, $3, $4)
         RETURNING id, report_id, user_id, content, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(report_id)
    .bind(user_id)
    .bind(content)
    .fetch_one(executor)
    .await?;
    Ok(comment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::report;
    use serde_json::json;

    #[test]
    fn only_creator_or_admin_edits_drafts() {
        let creator = Uuid::new_v4();
        let draft = report(ReportStatus::Draft, creator);

        assert!(check_editable(&draft, Actor { id: creator, role: Role::Engineer }).is_ok());
        assert!(check_editable(&draft, Actor { id: Uuid::new_v4(), role: Role::Admin }).is_ok());

        let err = check_editable(&draft, Actor { id: Uuid::new_v4(), role: Role::Engineer }).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn pending_reports_are_locked() {
        let creator = Uuid::new_v4();
        for status in [ReportStatus::PendingTmApproval, ReportStatus::PendingPmApproval, ReportStatus::Completed] {
            let err = check_editable(&report(status, creator), Actor { id: creator, role: Role::Engineer })
                .unwrap_err();
            assert_eq!(err.status_code(), 409);
        }
        let rejected = report(ReportStatus::Rejected, creator);
        assert!(check_editable(&rejected, Actor { id: creator, role: Role::Engineer }).is_ok());
    }

    #[test]
    fn changes_distinguish_null_from_absent() {
        let changes: ReportChanges = serde_json::from_value(json!({ "title": "New", "tmId": null })).unwrap();
        assert_eq!(changes.tm_id, Some(None));
        assert_eq!(changes.pm_id, None);

        let pm = Uuid::new_v4();
        let changes: ReportChanges = serde_json::from_value(json!({ "pmId": pm })).unwrap();
        assert_eq!(changes.pm_id, Some(Some(pm)));
    }

    #[test]
    fn document_info_sync_takes_non_blank_fields() {
        let tm = Uuid::new_v4();
        let sync = DocumentInfoSync::from_step(&json!({
            "title": " Site Acceptance ",
            "projectRef": "",
            "revision": "2.0",
            "tmId": tm.to_string(),
            "pmId": "",
            "preparedBy": "J. Smith"
        }))
        .unwrap();

        assert_eq!(
            sync,
            DocumentInfoSync {
                title: Some("Site Acceptance".into()),
                revision: Some("2.0".into()),
                tm_id: Some(tm),
                ..Default::default()
            }
        );

        let err = DocumentInfoSync::from_step(&json!({ "tmId": "not-a-uuid" })).unwrap_err();
        assert!(err.field_errors().and_then(|f| f.get("tmId")).is_some());
    }

    #[test]
    fn search_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("SAT"), "%SAT%");
        assert_eq!(like_pattern("50%_done"), "%50\\%\\_done%");
    }

    #[test]
    fn steps_sort_into_wizard_order() {
        let now = Utc::now();
        let step = |name: &str| ReportStep {
            id: Uuid::new_v4(),
            report_id: Uuid::nil(),
            step_name: name.into(),
            data: json!({}),
            created_at: now,
            updated_at: now,
        };
        let mut steps = vec![step("review_submit"), step("legacy"), step("pre_configuration"), step("signal_tests")];
        wizard_order(&mut steps);
        let names: Vec<_> = steps.iter().map(|s| s.step_name.as_str()).collect();
        assert_eq!(names, vec!["pre_configuration", "signal_tests", "review_submit", "legacy"]);
    }

    #[test]
    fn export_filename_is_header_safe() {
        let mut completed = report(ReportStatus::Completed, Uuid::new_v4());
        completed.document_ref = "DOC/001 A".into();
        let detail = ReportDetail {
            report: completed,
            creator: None,
            technical_manager: None,
            project_manager: None,
            steps: Vec::new(),
            signatures: Vec::new(),
            comments: Vec::new(),
            files: Vec::new(),
        };
        let export = ReportExport { exported_at: Utc::now(), exported_by: Uuid::nil(), report: detail };
        assert_eq!(export.filename(), "SAT_DOC_001_A_Rev1.0.json");
    }

    #[test]
    fn participants_are_deduplicated() {
        let a = Uuid::new_v4();
        let mut r1 = report(ReportStatus::Draft, a);
        r1.tm_id = Some(a);
        let r2 = report(ReportStatus::Draft, a);
        assert_eq!(participant_ids([&r1, &r2].into_iter()), vec![a]);
    }
}
