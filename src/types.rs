/// Shared domain enums used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account roles. Stored as the Postgres enum `user_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Engineer,
    TechnicalManager,
    ProjectManager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Engineer => "ENGINEER",
            Role::TechnicalManager => "TECHNICAL_MANAGER",
            Role::ProjectManager => "PROJECT_MANAGER",
        }
    }

    /// Roles a user may pick for themselves on self-registration
    pub fn is_self_registrable(&self) -> bool {
        !matches!(self, Role::Admin)
    }

    /// Roles that can be assigned as report approvers
    pub fn is_approver(&self) -> bool {
        matches!(self, Role::TechnicalManager | Role::ProjectManager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "ENGINEER" => Ok(Role::Engineer),
            "TECHNICAL_MANAGER" => Ok(Role::TechnicalManager),
            "PROJECT_MANAGER" => Ok(Role::ProjectManager),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "user_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Pending,
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "PENDING",
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(UserStatus::Pending),
            "ACTIVE" => Ok(UserStatus::Active),
            "INACTIVE" => Ok(UserStatus::Inactive),
            other => Err(format!("Unknown user status '{}'", other)),
        }
    }
}

/// Report lifecycle states, see `crate::workflow` for the transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "report_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Draft,
    PendingTmApproval,
    PendingPmApproval,
    Completed,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "DRAFT",
            ReportStatus::PendingTmApproval => "PENDING_TM_APPROVAL",
            ReportStatus::PendingPmApproval => "PENDING_PM_APPROVAL",
            ReportStatus::Completed => "COMPLETED",
            ReportStatus::Rejected => "REJECTED",
        }
    }

    /// Metadata and steps may only change in these states
    pub fn is_editable(&self) -> bool {
        matches!(self, ReportStatus::Draft | ReportStatus::Rejected)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(ReportStatus::Draft),
            "PENDING_TM_APPROVAL" => Ok(ReportStatus::PendingTmApproval),
            "PENDING_PM_APPROVAL" => Ok(ReportStatus::PendingPmApproval),
            "COMPLETED" => Ok(ReportStatus::Completed),
            "REJECTED" => Ok(ReportStatus::Rejected),
            other => Err(format!("Unknown report status '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_wire_name() {
        for role in [Role::Admin, Role::Engineer, Role::TechnicalManager, Role::ProjectManager] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(serde_json::to_value(role).unwrap(), serde_json::json!(role.as_str()));
        }
        assert!("MANAGER".parse::<Role>().is_err());
    }

    #[test]
    fn only_draft_and_rejected_are_editable() {
        assert!(ReportStatus::Draft.is_editable());
        assert!(ReportStatus::Rejected.is_editable());
        assert!(!ReportStatus::PendingTmApproval.is_editable());
        assert!(!ReportStatus::PendingPmApproval.is_editable());
        assert!(!ReportStatus::Completed.is_editable());
    }

    #[test]
    fn admin_cannot_self_register() {
        assert!(!Role::Admin.is_self_registrable());
        assert!(Role::Engineer.is_self_registrable());
        assert!(Role::TechnicalManager.is_approver());
        assert!(!Role::Engineer.is_approver());
    }
}
