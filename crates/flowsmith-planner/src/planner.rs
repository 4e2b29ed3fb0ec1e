//! Intent → ordered list of steps.
//!
//! Each detected action is matched against every capability in the registry
//! and the single best-scoring step is kept. Output channels the user named
//! explicitly bypass scoring. The merged plan is ordered input → process →
//! output and padded with the catalog's default input/output steps when a
//! category is missing. Every choice is written to the request's decision log.

use std::cmp::Ordering;
use std::collections::HashMap;

use flowsmith_registry::{CapabilityRegistry, StepDefinition};
use flowsmith_types::{AgentContext, Decision, DetectedAction, Intent, PlannedStep, StepCategory};

const STAGE: &str = "planner";

/// Flat score for a step the user asked for by channel name.
pub const EXPLICIT_OUTPUT_SCORE: f64 = 0.95;
/// Flat score for an injected default input/output step.
pub const DEFAULT_STEP_SCORE: f64 = 0.5;
/// Subtracted from a fallback step's capability score.
pub const FALLBACK_PENALTY: f64 = 0.1;

/// Capability score of `step` for `action`, or `None` if it cannot perform it.
pub fn score_candidate(step: &StepDefinition, action: &DetectedAction) -> Option<f64> {
    let strength = step.strength_for(&action.action_type)?;
    let penalty = if step.is_fallback { FALLBACK_PENALTY } else { 0.0 };
    Some(strength * action.confidence * (1.0 / step.priority as f64) - penalty)
}

/// Build a [`PlannedStep`] from a catalog entry.
pub fn planned_step(def: &StepDefinition, score: f64, reason: impl Into<String>) -> PlannedStep {
    PlannedStep {
        node_id: def.id.clone(),
        category: def.category,
        label: def.label.clone(),
        reason: reason.into(),
        score,
        is_fallback: def.is_fallback,
    }
}

/// The catalog's default step for `category`, marked as a fallback.
pub fn default_planned_step(
    registry: &CapabilityRegistry,
    category: StepCategory,
    reason: impl Into<String>,
) -> Option<PlannedStep> {
    registry.default_step(category).map(|def| PlannedStep {
        is_fallback: true,
        ..planned_step(def, DEFAULT_STEP_SCORE, reason)
    })
}

pub fn plan_workflow(
    intent: &Intent,
    registry: &CapabilityRegistry,
    ctx: &mut AgentContext,
) -> Vec<PlannedStep> {
    if intent.actions.is_empty() {
        ctx.record(Decision::new(STAGE, "No actions detected; nothing to plan"));
        tracing::debug!("Empty intent; returning empty plan");
        return Vec::new();
    }

    let mut candidates = Vec::new();

    for action in &intent.actions {
        match best_match(registry, action) {
            Some((def, score)) => {
                let reason = format!(
                    "Best match for '{}' (confidence {:.2}, score {:.3})",
                    action.action_type, action.confidence, score
                );
                ctx.record(
                    Decision::new(STAGE, reason.clone())
                        .with_action(&action.action_type)
                        .with_node(&def.id),
                );
                candidates.push(planned_step(def, score, reason));
            }
            None => {
                ctx.record(
                    Decision::new(
                        STAGE,
                        format!("No catalog step can perform '{}'", action.action_type),
                    )
                    .with_action(&action.action_type),
                );
            }
        }
    }

    for output in &intent.outputs {
        match registry.output_channel(output) {
            Some(def) => {
                let reason = format!("User explicitly asked for {output}");
                ctx.record(
                    Decision::new(STAGE, reason.clone())
                        .with_action(output)
                        .with_node(&def.id),
                );
                candidates.push(planned_step(def, EXPLICIT_OUTPUT_SCORE, reason));
            }
            None => {
                ctx.record(
                    Decision::new(STAGE, format!("No output step mapped to channel '{output}'"))
                        .with_action(output),
                );
            }
        }
    }

    let mut plan = dedupe_by_node_id(candidates);
    plan.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then(b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
    });

    if !plan.iter().any(|s| s.category == StepCategory::Input) {
        inject_default(&mut plan, registry, StepCategory::Input, ctx);
    }
    if !plan.iter().any(|s| s.category == StepCategory::Output) {
        inject_default(&mut plan, registry, StepCategory::Output, ctx);
    }

    tracing::debug!(
        steps = plan.len(),
        ids = %plan.iter().map(|s| s.node_id.as_str()).collect::<Vec<_>>().join(" -> "),
        "Planned workflow"
    );
    plan
}

fn best_match<'a>(
    registry: &'a CapabilityRegistry,
    action: &DetectedAction,
) -> Option<(&'a StepDefinition, f64)> {
    let mut best: Option<(&StepDefinition, f64)> = None;
    for def in registry.list_all() {
        let Some(score) = score_candidate(def, action) else {
            continue;
        };
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((def, score));
        }
    }
    best
}

/// Keep one entry per `node_id`, the highest-scoring one, in first-seen order.
fn dedupe_by_node_id(candidates: Vec<PlannedStep>) -> Vec<PlannedStep> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<PlannedStep> = Vec::with_capacity(candidates.len());
    for step in candidates {
        match positions.get(&step.node_id) {
            Some(&i) => {
                if step.score > out[i].score {
                    out[i] = step;
                }
            }
            None => {
                positions.insert(step.node_id.clone(), out.len());
                out.push(step);
            }
        }
    }
    out
}

fn inject_default(
    plan: &mut Vec<PlannedStep>,
    registry: &CapabilityRegistry,
    category: StepCategory,
    ctx: &mut AgentContext,
) {
    let reason = format!("No {category} step selected; using catalog default");
    match default_planned_step(registry, category, reason.clone()) {
        Some(step) => {
            ctx.record(Decision::new(STAGE, reason).with_node(&step.node_id));
            if category == StepCategory::Input {
                plan.insert(0, step);
            } else {
                plan.push(step);
            }
        }
        None => {
            tracing::warn!(%category, "Catalog has no default step to inject");
            ctx.record(Decision::new(
                STAGE,
                format!("No {category} step selected and the catalog has no default {category}"),
            ));
        }
    }
}
