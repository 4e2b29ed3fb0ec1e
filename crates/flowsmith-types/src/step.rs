use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which part of a linear workflow a step belongs to.
///
/// The derived ordering is the order steps appear in an assembled chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    Input,
    Process,
    Output,
}

impl StepCategory {
    pub const ALL: [StepCategory; 3] = [StepCategory::Input, StepCategory::Process, StepCategory::Output];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepCategory::Input => "input",
            StepCategory::Process => "process",
            StepCategory::Output => "output",
        }
    }
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepCategory {
    type Err = crate::FlowError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "input" => Ok(StepCategory::Input),
            "process" => Ok(StepCategory::Process),
            "output" => Ok(StepCategory::Output),
            other => Err(crate::FlowError::Other(format!(
                "unknown step category '{other}'"
            ))),
        }
    }
}

/// A step chosen by the planner, in plan order.
///
/// `score` only ranks candidates during planning; it carries no meaning once
/// the plan is assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    pub node_id: String,
    pub category: StepCategory,
    pub label: String,
    pub reason: String,
    pub score: f64,
    #[serde(default)]
    pub is_fallback: bool,
}
