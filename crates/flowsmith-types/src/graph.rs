//! The workflow graph shape shared by the assembler, validator, and executor.
//!
//! Graphs produced outside this workspace (for example by an LLM-backed
//! generator) arrive as JSON, so missing fields deserialize to empty values
//! and are rejected later by structural validation instead of by serde.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::step::StepCategory;
use crate::{FlowError, Result};

/// Node `type` written by the assembler.
pub const NODE_TYPE: &str = "customNode";
/// Edge `type` written by the assembler.
pub const EDGE_TYPE: &str = "smoothstep";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Step payload carried by every node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub category: Option<StepCategory>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(rename = "type", default)]
    pub edge_type: String,
}

impl GraphNode {
    pub fn category(&self) -> Option<StepCategory> {
        self.data.category
    }

    pub fn is_category(&self, category: StepCategory) -> bool {
        self.data.category == Some(category)
    }
}

impl Graph {
    /// Parse a graph from loosely-typed JSON.
    ///
    /// `nodes` and `edges` must both be arrays; anything else is an
    /// [`FlowError::InvalidGraph`] rather than a serde error so callers can
    /// surface it as a client mistake.
    pub fn from_value(value: Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| FlowError::InvalidGraph("graph must be a JSON object".into()))?;
        for key in ["nodes", "edges"] {
            match obj.get(key) {
                Some(Value::Array(_)) => {}
                Some(_) => {
                    return Err(FlowError::InvalidGraph(format!("'{key}' must be an array")))
                }
                None => return Err(FlowError::InvalidGraph(format!("missing '{key}' array"))),
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(source)?;
        Self::from_value(value)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn has_category(&self, category: StepCategory) -> bool {
        self.nodes.iter().any(|n| n.is_category(category))
    }

    /// Edges leaving `node_id`, in declaration order.
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> {
        self.edges.iter().filter(move |e| e.source == node_id)
    }
}
