//! Report approval state machine
//!
//! ```text
//! DRAFT ──submit──▶ PENDING_TM_APPROVAL ──approve──▶ PENDING_PM_APPROVAL ──approve──▶ COMPLETED
//!   ▲                    │                                  │
//!   │                  reject                             reject
//!   │                    ▼                                  ▼
//!   └──── submit ───── REJECTED ◀───────────────────────────┘
//! ```
//!
//! Decisions here are pure; the report service applies them inside a
//! transaction and records the signature or comment they call for.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::Report;
use crate::types::{ReportStatus, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowAction {
    Submit,
    Approve,
    Reject,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Submit => "submit",
            WorkflowAction::Approve => "approve",
            WorkflowAction::Reject => "reject",
        }
    }
}

/// Who is attempting the action
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

/// A report field that blocks an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub field: &'static str,
    pub message: String,
}

impl Issue {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Cannot {action} a report in status {status}")]
    InvalidTransition { status: ReportStatus, action: &'static str },

    #[error("Only {expected} may {action} this report")]
    NotPermitted { action: &'static str, expected: &'static str },

    #[error("Report is not ready for this action")]
    Preconditions(Vec<Issue>),

    #[error("A rejection reason is required")]
    ReasonRequired,
}

/// Outcome of a permitted action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ReportStatus,
    pub to: ReportStatus,
    /// Role recorded on the signature, if the step is signed
    pub signer_role: Option<Role>,
}

impl Transition {
    pub fn completes(&self) -> bool {
        self.to == ReportStatus::Completed
    }
}

/// Decide whether `actor` may apply `action` to `report`.
///
/// Checks run in a fixed order: state first (409), then actor (403), then
/// report content (422).
pub fn plan(report: &Report, action: WorkflowAction, actor: Actor) -> Result<Transition, WorkflowError> {
    let is_admin = actor.role == Role::Admin;
    let from = report.status;

    let (to, signer_role) = match (from, action) {
        (ReportStatus::Draft | ReportStatus::Rejected, WorkflowAction::Submit) => {
            if !is_admin && report.creator_id != actor.id {
                return Err(WorkflowError::NotPermitted {
                    action: action.as_str(),
                    expected: "the report creator",
                });
            }
            (ReportStatus::PendingTmApproval, Some(Role::Engineer))
        }
        (ReportStatus::PendingTmApproval, WorkflowAction::Approve | WorkflowAction::Reject) => {
            if !is_admin && report.tm_id != Some(actor.id) {
                return Err(WorkflowError::NotPermitted {
                    action: action.as_str(),
                    expected: "the assigned technical manager",
                });
            }
            match action {
                WorkflowAction::Approve => (ReportStatus::PendingPmApproval, Some(Role::TechnicalManager)),
                _ => (ReportStatus::Rejected, None),
            }
        }
        (ReportStatus::PendingPmApproval, WorkflowAction::Approve | WorkflowAction::Reject) => {
            if !is_admin && report.pm_id != Some(actor.id) {
                return Err(WorkflowError::NotPermitted {
                    action: action.as_str(),
                    expected: "the assigned project manager",
                });
            }
            match action {
                WorkflowAction::Approve => (ReportStatus::Completed, Some(Role::ProjectManager)),
                _ => (ReportStatus::Rejected, None),
            }
        }
        _ => {
            return Err(WorkflowError::InvalidTransition {
                status: from,
                action: action.as_str(),
            })
        }
    };

    let issues = match (from, action) {
        (_, WorkflowAction::Submit) => submission_issues(report),
        (ReportStatus::PendingTmApproval, WorkflowAction::Approve) if report.pm_id.is_none() => {
            vec![Issue::new("pmId", "A project manager must be assigned before technical approval")]
        }
        _ => Vec::new(),
    };
    if !issues.is_empty() {
        return Err(WorkflowError::Preconditions(issues));
    }

    Ok(Transition { from, to, signer_role })
}

/// Everything that would stop `report` from being submitted
pub fn submission_issues(report: &Report) -> Vec<Issue> {
    let mut issues = Vec::new();

    let required = [
        ("title", report.title.as_str(), "Title is required"),
        ("projectRef", report.project_ref.as_str(), "Project reference is required"),
        ("documentRef", report.document_ref.as_str(), "Document reference is required"),
        ("revision", report.revision.as_str(), "Revision is required"),
    ];
    for (field, value, message) in required {
        if value.trim().is_empty() {
            issues.push(Issue::new(field, message));
        }
    }

    if report.tm_id.is_none() {
        issues.push(Issue::new("tmId", "A technical manager must be assigned"));
    }

    issues
}

/// Rejections must say why
pub fn rejection_reason(reason: Option<&str>) -> Result<String, WorkflowError> {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_string()),
        _ => Err(WorkflowError::ReasonRequired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor, Cast};

    #[test]
    fn happy_path_walks_every_stage() {
        let c = Cast::new();
        let mut r = c.report(ReportStatus::Draft);

        let t = plan(&r, WorkflowAction::Submit, actor(c.engineer, Role::Engineer)).unwrap();
        assert_eq!(t.to, ReportStatus::PendingTmApproval);
        assert_eq!(t.signer_role, Some(Role::Engineer));
        r.status = t.to;

        let t = plan(&r, WorkflowAction::Approve, actor(c.tm, Role::TechnicalManager)).unwrap();
        assert_eq!(t.to, ReportStatus::PendingPmApproval);
        assert_eq!(t.signer_role, Some(Role::TechnicalManager));
        r.status = t.to;

        let t = plan(&r, WorkflowAction::Approve, actor(c.pm, Role::ProjectManager)).unwrap();
        assert_eq!(t.to, ReportStatus::Completed);
        assert!(t.completes());
    }

    #[test]
    fn rejected_report_can_be_resubmitted() {
        let c = Cast::new();
        let r = c.report(ReportStatus::Rejected);
        let t = plan(&r, WorkflowAction::Submit, actor(c.engineer, Role::Engineer)).unwrap();
        assert_eq!(t.to, ReportStatus::PendingTmApproval);
    }

    #[test]
    fn reject_from_either_pending_stage() {
        let c = Cast::new();
        let r = c.report(ReportStatus::PendingTmApproval);
        let t = plan(&r, WorkflowAction::Reject, actor(c.tm, Role::TechnicalManager)).unwrap();
        assert_eq!(t.to, ReportStatus::Rejected);
        assert_eq!(t.signer_role, None);

        let r = c.report(ReportStatus::PendingPmApproval);
        let t = plan(&r, WorkflowAction::Reject, actor(c.pm, Role::ProjectManager)).unwrap();
        assert_eq!(t.to, ReportStatus::Rejected);
    }

    #[test]
    fn any_other_pair_is_an_invalid_transition() {
        let c = Cast::new();
        let admin = actor(Uuid::new_v4(), Role::Admin);
        let invalid = [
            (ReportStatus::Draft, WorkflowAction::Approve),
            (ReportStatus::Draft, WorkflowAction::Reject),
            (ReportStatus::PendingTmApproval, WorkflowAction::Submit),
            (ReportStatus::PendingPmApproval, WorkflowAction::Submit),
            (ReportStatus::Completed, WorkflowAction::Submit),
            (ReportStatus::Completed, WorkflowAction::Approve),
            (ReportStatus::Completed, WorkflowAction::Reject),
            (ReportStatus::Rejected, WorkflowAction::Approve),
            (ReportStatus::Rejected, WorkflowAction::Reject),
        ];
        for (status, action) in invalid {
            let r = c.report(status);
            assert!(
                matches!(plan(&r, action, admin), Err(WorkflowError::InvalidTransition { .. })),
                "{:?} / {:?} should be invalid",
                status,
                action
            );
        }
    }

    #[test]
    fn wrong_actor_is_not_permitted() {
        let c = Cast::new();
        let stranger = actor(Uuid::new_v4(), Role::Engineer);

        let r = c.report(ReportStatus::Draft);
        assert!(matches!(plan(&r, WorkflowAction::Submit, stranger), Err(WorkflowError::NotPermitted { .. })));

        // The PM cannot act during the TM stage and vice versa
        let r = c.report(ReportStatus::PendingTmApproval);
        let pm = actor(c.pm, Role::ProjectManager);
        assert!(matches!(plan(&r, WorkflowAction::Approve, pm), Err(WorkflowError::NotPermitted { .. })));

        let r = c.report(ReportStatus::PendingPmApproval);
        let tm = actor(c.tm, Role::TechnicalManager);
        assert!(matches!(plan(&r, WorkflowAction::Reject, tm), Err(WorkflowError::NotPermitted { .. })));
    }

    #[test]
    fn admin_may_act_at_any_stage() {
        let c = Cast::new();
        let admin = actor(Uuid::new_v4(), Role::Admin);
        for (status, action) in [
            (ReportStatus::Draft, WorkflowAction::Submit),
            (ReportStatus::PendingTmApproval, WorkflowAction::Approve),
            (ReportStatus::PendingPmApproval, WorkflowAction::Reject),
        ] {
            assert!(plan(&c.report(status), action, admin).is_ok());
        }
    }

    #[test]
    fn submit_requires_tm_and_document_info() {
        let c = Cast::new();
        let mut r = c.report(ReportStatus::Draft);
        r.tm_id = None;
        r.revision = "  ".into();

        match plan(&r, WorkflowAction::Submit, actor(c.engineer, Role::Engineer)) {
            Err(WorkflowError::Preconditions(issues)) => {
                let fields: Vec<_> = issues.iter().map(|i| i.field).collect();
                assert_eq!(fields, vec!["revision", "tmId"]);
            }
            other => panic!("expected preconditions failure, got {:?}", other),
        }
    }

    #[test]
    fn tm_approval_requires_pm() {
        let c = Cast::new();
        let mut r = c.report(ReportStatus::PendingTmApproval);
        r.pm_id = None;
        let result = plan(&r, WorkflowAction::Approve, actor(c.tm, Role::TechnicalManager));
        assert!(matches!(result, Err(WorkflowError::Preconditions(ref issues)) if issues[0].field == "pmId"));

        // Rejection does not need a PM
        assert!(plan(&r, WorkflowAction::Reject, actor(c.tm, Role::TechnicalManager)).is_ok());
    }

    #[test]
    fn state_is_checked_before_actor() {
        let c = Cast::new();
        let r = c.report(ReportStatus::Completed);
        let stranger = actor(Uuid::new_v4(), Role::Engineer);
        assert!(matches!(
            plan(&r, WorkflowAction::Approve, stranger),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn rejection_reason_must_be_present() {
        assert!(matches!(rejection_reason(None), Err(WorkflowError::ReasonRequired)));
        assert!(matches!(rejection_reason(Some("   ")), Err(WorkflowError::ReasonRequired)));
        assert_eq!(rejection_reason(Some(" Missing IO list ")).unwrap(), "Missing IO list");
    }
}
