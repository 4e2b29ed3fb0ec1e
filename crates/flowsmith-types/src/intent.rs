use serde::{Deserialize, Serialize};

/// One action family recognised in a request, with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub confidence: f64,
}

impl DetectedAction {
    pub fn new(action_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            action_type: action_type.into(),
            confidence,
        }
    }
}

/// Structured reading of a free-text automation request.
///
/// Every field is always present; an unparseable request is the
/// [`Default`] value rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub actions: Vec<DetectedAction>,
    pub sources: Vec<String>,
    pub outputs: Vec<String>,
    pub frequency: Option<String>,
    pub confidence: f64,
    pub raw: String,
}

impl Intent {
    pub fn has_action(&self, action_type: &str) -> bool {
        self.actions.iter().any(|a| a.action_type == action_type)
    }
}
