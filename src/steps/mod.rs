//! Report wizard steps
//!
//! Each step is stored as one JSON object per report. This module knows the
//! canonical step names and their order, checks that saved data has the
//! right shape, scores completion, and derives signal test rows from the
//! pre-configuration.

pub mod completion;
pub mod schema;
pub mod signals;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FieldErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    PreConfiguration,
    DocumentInfo,
    IntroductionScope,
    PreTestRequirements,
    AssetRegister,
    SignalTests,
    ProcessScadaAlarms,
    TestEquipmentPunch,
    ReviewSubmit,
}

impl StepName {
    /// Wizard order
    pub const ALL: [StepName; 9] = [
        StepName::PreConfiguration,
        StepName::DocumentInfo,
        StepName::IntroductionScope,
        StepName::PreTestRequirements,
        StepName::AssetRegister,
        StepName::SignalTests,
        StepName::ProcessScadaAlarms,
        StepName::TestEquipmentPunch,
        StepName::ReviewSubmit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::PreConfiguration => "pre_configuration",
            StepName::DocumentInfo => "document_info",
            StepName::IntroductionScope => "introduction_scope",
            StepName::PreTestRequirements => "pre_test_requirements",
            StepName::AssetRegister => "asset_register",
            StepName::SignalTests => "signal_tests",
            StepName::ProcessScadaAlarms => "process_scada_alarms",
            StepName::TestEquipmentPunch => "test_equipment_punch",
            StepName::ReviewSubmit => "review_submit",
        }
    }

    /// Position in the wizard, used to order exports
    pub fn position(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(Self::ALL.len())
    }

    /// Steps that count towards completion
    pub fn is_scored(&self) -> bool {
        !matches!(self, StepName::ReviewSubmit)
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| StepError::UnknownStep(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    #[error("Step data does not match the expected shape")]
    Shape(FieldErrors),

    #[error("Save the pre-configuration step before generating signal rows")]
    MissingPreConfiguration,
}
