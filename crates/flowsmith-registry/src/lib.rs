//! Read-only capability catalog of plannable workflow steps.
//!
//! The catalog is a JSON document loaded once at startup into a
//! [`CapabilityRegistry`]. The registry is never mutated afterwards, so a
//! single instance can be shared by reference (or `Arc`) across concurrent
//! requests without locking.
//!
//! # Example
//! ```
//! use flowsmith_registry::CapabilityRegistry;
//! use flowsmith_types::StepCategory;
//!
//! let registry = CapabilityRegistry::builtin().unwrap();
//! assert!(registry.by_id("rss_fetch").is_some());
//! assert!(registry.by_category(StepCategory::Output).count() > 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use flowsmith_types::{FlowError, Result, StepCategory};

const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.json");

// ---------------------------------------------------------------------------
// Catalog types
// ---------------------------------------------------------------------------

/// An action a step can perform, weighted by how well it performs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub action: String,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: String,
    pub category: StepCategory,
    pub label: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    pub priority: u32,
    #[serde(default)]
    pub is_fallback: bool,
}

impl StepDefinition {
    /// Strength of this step for `action`, if it advertises it.
    pub fn strength_for(&self, action: &str) -> Option<f64> {
        self.capabilities
            .iter()
            .find(|c| c.action == action)
            .map(|c| c.strength)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDefaults {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// On-disk catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub defaults: CatalogDefaults,
    #[serde(default)]
    pub output_channels: HashMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

// ---------------------------------------------------------------------------
// CapabilityRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    steps: Vec<StepDefinition>,
    index: HashMap<String, usize>,
    defaults: CatalogDefaults,
    output_channels: HashMap<String, String>,
}

impl CapabilityRegistry {
    /// The catalog compiled into this crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    /// Load a catalog file. A missing or unreadable file is fatal.
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| FlowError::RegistryLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let registry = Self::from_json_str(&source).map_err(|e| FlowError::RegistryLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), steps = registry.len(), "Capability catalog loaded");
        Ok(registry)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(source)?;
        Self::from_catalog(catalog)
    }

    /// Build a registry from an already-parsed catalog, checking its invariants.
    pub fn from_catalog(catalog: Catalog) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, step) in catalog.steps.iter().enumerate() {
            check_step(step)?;
            if index.insert(step.id.clone(), i).is_some() {
                return Err(FlowError::InvalidCatalog(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        let lookup = |id: &str| index.get(id).map(|&i| &catalog.steps[i]);

        for (category, id) in [
            (StepCategory::Input, &catalog.defaults.input),
            (StepCategory::Output, &catalog.defaults.output),
        ] {
            let Some(id) = id else { continue };
            match lookup(id) {
                Some(step) if step.category == category => {}
                Some(step) => {
                    return Err(FlowError::InvalidCatalog(format!(
                        "default {category} step '{id}' has category '{}'",
                        step.category
                    )))
                }
                None => {
                    return Err(FlowError::InvalidCatalog(format!(
                        "default {category} step '{id}' is not in the catalog"
                    )))
                }
            }
        }

        for (channel, id) in &catalog.output_channels {
            match lookup(id) {
                Some(step) if step.category == StepCategory::Output => {}
                _ => {
                    return Err(FlowError::InvalidCatalog(format!(
                        "output channel '{channel}' maps to '{id}', which is not an output step"
                    )))
                }
            }
        }

        Ok(Self {
            steps: catalog.steps,
            index,
            defaults: catalog.defaults,
            output_channels: catalog.output_channels,
        })
    }

    pub fn list_all(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn by_category(&self, category: StepCategory) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter().filter(move |s| s.category == category)
    }

    pub fn by_id(&self, id: &str) -> Option<&StepDefinition> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// The step injected when a plan or graph lacks `category`.
    ///
    /// Only input and output have defaults; process never does.
    pub fn default_step(&self, category: StepCategory) -> Option<&StepDefinition> {
        let id = match category {
            StepCategory::Input => self.defaults.input.as_deref(),
            StepCategory::Output => self.defaults.output.as_deref(),
            StepCategory::Process => None,
        }?;
        self.by_id(id)
    }

    /// The output step an explicit channel keyword (`"email"`, `"slack"`, ...) maps to.
    pub fn output_channel(&self, channel: &str) -> Option<&StepDefinition> {
        self.output_channels
            .get(channel)
            .and_then(|id| self.by_id(id))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every action type some step can perform.
    pub fn known_actions(&self) -> HashSet<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.capabilities.iter().map(|c| c.action.as_str()))
            .collect()
    }
}

fn check_step(step: &StepDefinition) -> Result<()> {
    if step.id.trim().is_empty() {
        return Err(FlowError::InvalidCatalog("step with empty id".into()));
    }
    if step.priority == 0 {
        return Err(FlowError::InvalidCatalog(format!(
            "step '{}' has priority 0; priorities start at 1",
            step.id
        )));
    }
    if let Some(cap) = step
        .capabilities
        .iter()
        .find(|c| !(c.strength > 0.0 && c.strength <= 1.0))
    {
        return Err(FlowError::InvalidCatalog(format!(
            "step '{}' has strength {} for '{}'; expected (0, 1]",
            step.id, cap.strength, cap.action
        )));
    }
    Ok(())
}
