//! Per-request audit trail for workflow synthesis.
//!
//! An [`AgentContext`] lives for exactly one request. Every stage appends to
//! its decision and repair logs; nothing is ever removed. At the end of the
//! request it is reduced to an [`AgentSummary`] for explainability UIs.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::intent::Intent;
use crate::step::PlannedStep;

/// Why a stage did what it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            action: None,
            node_id: None,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

/// A correction applied (or deliberately skipped) by the repairer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRecord {
    pub issue_type: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RepairRecord {
    pub fn new(
        issue_type: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            issue_type: issue_type.into(),
            action: action.into(),
            node_id: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct AgentContext {
    pub id: String,
    pub prompt: String,
    pub timestamp: DateTime<Utc>,
    pub intent: Intent,
    pub selected_nodes: Vec<PlannedStep>,
    pub workflow: Option<Graph>,
    decisions: Vec<Decision>,
    repairs: Vec<RepairRecord>,
    started: Instant,
}

/// Response-safe projection of a finished [`AgentContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub decisions: Vec<Decision>,
    pub repairs: Vec<RepairRecord>,
    pub intent: Intent,
    /// Milliseconds between context creation and finalization.
    pub processing_time: u64,
}

impl AgentContext {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            timestamp: Utc::now(),
            intent: Intent::default(),
            selected_nodes: Vec::new(),
            workflow: None,
            decisions: Vec::new(),
            repairs: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, decision: Decision) {
        tracing::debug!(
            request = %self.id,
            stage = %decision.stage,
            action = decision.action.as_deref().unwrap_or(""),
            reason = %decision.reason,
            "decision"
        );
        self.decisions.push(decision);
    }

    pub fn record_repair(&mut self, repair: RepairRecord) {
        tracing::debug!(
            request = %self.id,
            issue = %repair.issue_type,
            action = %repair.action,
            "repair"
        );
        self.repairs.push(repair);
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn repairs(&self) -> &[RepairRecord] {
        &self.repairs
    }

    pub fn finalize(&self) -> AgentSummary {
        AgentSummary {
            decisions: self.decisions.clone(),
            repairs: self.repairs.clone(),
            intent: self.intent.clone(),
            processing_time: self.started.elapsed().as_millis() as u64,
        }
    }
}
