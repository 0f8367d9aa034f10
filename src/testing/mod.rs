//! Fixtures shared by unit tests

use chrono::Utc;
use uuid::Uuid;

use crate::database::models::Report;
use crate::types::{ReportStatus, Role};
use crate::workflow::Actor;

/// The people on a report: creator, technical manager and project manager
pub struct Cast {
    pub engineer: Uuid,
    pub tm: Uuid,
    pub pm: Uuid,
}

impl Cast {
    pub fn new() -> Self {
        Self {
            engineer: Uuid::new_v4(),
            tm: Uuid::new_v4(),
            pm: Uuid::new_v4(),
        }
    }

    /// A fully assigned report in `status`
    pub fn report(&self, status: ReportStatus) -> Report {
        Report {
            tm_id: Some(self.tm),
            pm_id: Some(self.pm),
            ..report(status, self.engineer)
        }
    }
}

/// An unassigned report created by `creator`
pub fn report(status: ReportStatus, creator: Uuid) -> Report {
    let now = Utc::now();
    Report {
        id: Uuid::new_v4(),
        title: "Control System Validation".into(),
        project_ref: "PRJ-1".into(),
        document_ref: "SAT-1".into(),
        revision: "1.0".into(),
        report_type: "SAT".into(),
        status,
        creator_id: creator,
        tm_id: None,
        pm_id: None,
        storage_location: None,
        created_at: now,
        updated_at: now,
        submitted_at: None,
        completed_at: None,
    }
}

pub fn actor(id: Uuid, role: Role) -> Actor {
    Actor { id, role }
}
