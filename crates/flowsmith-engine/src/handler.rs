//! Step handler trait, dynamic dispatch wrapper, and handler registry.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use flowsmith_types::{GraphNode, Result, StepCategory};

use crate::context::RunContext;

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

/// What a handler reports for one node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutcome {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Handler-specific fields copied into the node's log entry.
    pub details: Map<String, Value>,
}

impl StepOutcome {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// StepHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Registry key: a step id (`send_email`), a category (`output`), or a node type.
    fn handler_type(&self) -> &str;

    /// Execute one node. `outputs` holds every earlier node's output keyed by graph id.
    async fn handle(
        &self,
        node: &GraphNode,
        outputs: &HashMap<String, Value>,
        ctx: &RunContext,
    ) -> Result<StepOutcome>;
}

// ---------------------------------------------------------------------------
// DynHandler (object-safe wrapper)
// ---------------------------------------------------------------------------

pub struct DynHandler(Box<dyn StepHandler>);

impl DynHandler {
    pub fn new(handler: impl StepHandler + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub fn handler_type(&self) -> &str {
        self.0.handler_type()
    }

    pub async fn handle(
        &self,
        node: &GraphNode,
        outputs: &HashMap<String, Value>,
        ctx: &RunContext,
    ) -> Result<StepOutcome> {
        self.0.handle(node, outputs, ctx).await
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, DynHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its `handler_type()`, replacing any previous one.
    pub fn register(&mut self, handler: impl StepHandler + 'static) {
        let t = handler.handler_type().to_string();
        self.handlers.insert(t, DynHandler::new(handler));
    }

    /// Resolve a node to a registry key using 3-step priority:
    /// 1. The catalog step id in `data.nodeId`
    /// 2. The node's category
    /// 3. The node's `type`
    pub fn resolve_type(&self, node: &GraphNode) -> Option<String> {
        let category = node.category().map(|c| c.as_str());
        [
            Some(node.data.node_id.as_str()),
            category,
            Some(node.node_type.as_str()),
        ]
        .into_iter()
        .flatten()
        .find(|key| !key.is_empty() && self.handlers.contains_key(*key))
        .map(String::from)
    }

    pub fn resolve(&self, node: &GraphNode) -> Option<&DynHandler> {
        self.resolve_type(node).and_then(|t| self.handlers.get(&t))
    }

    pub fn get(&self, handler_type: &str) -> Option<&DynHandler> {
        self.handlers.get(handler_type)
    }

    pub fn has(&self, handler_type: &str) -> bool {
        self.handlers.contains_key(handler_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built-in handlers
// ---------------------------------------------------------------------------

/// Dry-run handler: performs no side effects, echoes what it would have done.
pub struct RecordingHandler {
    category: StepCategory,
}

impl RecordingHandler {
    pub fn new(category: StepCategory) -> Self {
        Self { category }
    }
}

#[async_trait]
impl StepHandler for RecordingHandler {
    fn handler_type(&self) -> &str {
        self.category.as_str()
    }

    async fn handle(
        &self,
        node: &GraphNode,
        outputs: &HashMap<String, Value>,
        ctx: &RunContext,
    ) -> Result<StepOutcome> {
        let mut upstream: Vec<&str> = outputs.keys().map(String::as_str).collect();
        upstream.sort_unstable();

        tracing::debug!(
            node = %node.id,
            step = %node.data.node_id,
            category = %self.category,
            upstream = upstream.len(),
            "Recording step"
        );

        let output = json!({
            "step": node.data.node_id,
            "label": node.data.label,
            "category": self.category,
            "upstream": upstream,
            "config": node.data.config,
        });
        Ok(StepOutcome::success(output)
            .with_detail("handler", json!("recording"))
            .with_detail("dryRun", json!(ctx.is_dry_run().await)))
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

/// A registry with a [`RecordingHandler`] for every category, so any
/// categorised graph can be run end to end without side effects.
pub fn default_registry() -> HandlerRegistry {
    let mut reg = HandlerRegistry::new();
    for category in StepCategory::ALL {
        reg.register(RecordingHandler::new(category));
    }
    reg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
