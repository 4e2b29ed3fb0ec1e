//! Per-run key/value store shared with every handler.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Cheap-to-clone handle to one run's shared state.
///
/// Clones share the same store; the executor hands the same context to every
/// handler in a run so callers can seed values (`dry_run`, credentials,
/// request ids) that handlers read back.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    values: Arc<tokio::sync::RwLock<HashMap<String, Value>>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            values: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    /// Create a context pre-populated with `values`.
    pub fn with_values(values: HashMap<String, Value>) -> Self {
        Self {
            values: Arc::new(tokio::sync::RwLock::new(values)),
            ..Self::new()
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Insert or overwrite a key.
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.values.write().await.insert(key.into(), value);
    }

    /// Read a value by key (cloned).
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    /// `true` unless `dry_run` is explicitly set to `false`.
    pub async fn is_dry_run(&self) -> bool {
        self.get("dry_run")
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    /// Shallow copy of the current values map.
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().await.clone()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
