//! Canonical intent representation.
//!
//! An [`Intent`] is the resolved meaning of one utterance: a dotted
//! `capability.action` name, a confidence score, and extracted parameters.
//! Produced once per turn by the Intent Resolver (or synthesized by the
//! Proactive Rule Engine) and immutable after creation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name used when no intent could be resolved.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Name prefix for system-origin proactive intents.
pub const PROACTIVE_PREFIX: &str = "proactive.";

/// The resolved meaning of an utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    /// Dotted `capability.action` name, e.g. `weather.query`.
    pub name: String,
    /// Resolution confidence in `[0, 1]`.
    pub confidence: f64,
    /// Extracted entities, name → value.
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// The utterance (or rendered message) this intent was resolved from.
    pub original_text: String,
}

impl Intent {
    /// Create an intent, clamping confidence into `[0, 1]`.
    #[must_use]
    pub fn new(name: impl Into<String>, confidence: f64, original_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            parameters: HashMap::new(),
            original_text: original_text.into(),
        }
    }

    /// Attach extracted parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// The zero-confidence `unknown` intent. The pipeline must be able to
    /// run to a deterministic fallback with this value.
    #[must_use]
    pub fn unknown(original_text: impl Into<String>) -> Self {
        Self::new(UNKNOWN_INTENT, 0.0, original_text)
    }

    /// A system-origin intent for a proactive rule (`proactive.<rule>`).
    #[must_use]
    pub fn proactive(rule_name: &str, message: impl Into<String>) -> Self {
        Self::new(format!("{PROACTIVE_PREFIX}{rule_name}"), 1.0, message)
    }

    /// Whether this is the unresolved `unknown` intent.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_INTENT
    }

    /// Whether this intent was synthesized by the proactive engine.
    #[must_use]
    pub fn is_proactive(&self) -> bool {
        self.name.starts_with(PROACTIVE_PREFIX)
    }

    /// The capability part of the dotted name (`weather` in `weather.query`).
    #[must_use]
    pub fn capability(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}
