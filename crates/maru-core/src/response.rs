//! Handler responses and the aggregated dialog result.
//!
//! A [`PluginResponse`] is produced by exactly one capability-handler
//! invocation and never mutated after return. The dispatcher aggregates
//! all successful responses for a turn into one [`DialogResult`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{DeviceId, TurnId};
use crate::intent::Intent;

/// A side effect requested by a handler (device command, notification, …).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogAction {
    /// Action kind, e.g. `device.set_brightness` or `notify.push`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Target device, if the action addresses one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<DeviceId>,
    /// Free-form action payload.
    #[serde(default)]
    pub payload: Value,
}

impl DialogAction {
    /// Create an untargeted action.
    #[must_use]
    pub fn new(action_type: impl Into<String>, payload: Value) -> Self {
        Self {
            action_type: action_type.into(),
            target: None,
            payload,
        }
    }

    /// Address this action at a device.
    #[must_use]
    pub fn targeting(mut self, device: DeviceId) -> Self {
        self.target = Some(device);
        self
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// The result of one capability-handler invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResponse {
    /// Text to speak.
    pub speech: String,
    /// Optional text for devices with a display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    /// Side effects to execute, in order. May be empty.
    #[serde(default)]
    pub actions: Vec<DialogAction>,
    /// Entries merged into context short-term memory on success.
    #[serde(default)]
    pub context_update: HashMap<String, Value>,
    /// Handler confidence in `[0, 1]`. Defaults to 1.0.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Follow-up phrases offered to the user.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Whether the handler considers the conversation finished.
    #[serde(default)]
    pub end_conversation: bool,
}

impl PluginResponse {
    /// A speech-only response at full confidence.
    #[must_use]
    pub fn speech(text: impl Into<String>) -> Self {
        Self {
            speech: text.into(),
            display_text: None,
            actions: Vec::new(),
            context_update: HashMap::new(),
            confidence: 1.0,
            suggestions: Vec::new(),
            end_conversation: false,
        }
    }

    /// Set the confidence (clamped to `[0, 1]`).
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Append an action.
    #[must_use]
    pub fn with_action(mut self, action: DialogAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Add a context-update entry.
    #[must_use]
    pub fn with_context_update(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.context_update.insert(key.into(), value);
        self
    }

    /// Add a follow-up suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, phrase: impl Into<String>) -> Self {
        self.suggestions.push(phrase.into());
        self
    }

    /// Mark the conversation as finished.
    #[must_use]
    pub fn ending_conversation(mut self) -> Self {
        self.end_conversation = true;
        self
    }
}

/// How a single dispatched handler fared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerStatus {
    /// Returned a response within its deadline.
    Success,
    /// Returned an error.
    Failed,
    /// Exceeded its per-invocation deadline.
    TimedOut,
}

/// Per-handler diagnostic record attached to a [`DialogResult`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerOutcome {
    /// Handler name.
    pub handler: String,
    /// Outcome of the invocation.
    pub status: HandlerStatus,
    /// Wall-clock latency of the invocation.
    pub latency_ms: u64,
}

/// The aggregated response for one turn (user or proactive).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogResult {
    /// ID of the response turn recorded in history.
    pub turn_id: TurnId,
    /// The intent this turn answered.
    pub intent: Intent,
    /// Text to speak.
    pub speech: String,
    /// Optional display text from the primary handler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    /// Concatenated actions from all successful handlers, primary first.
    #[serde(default)]
    pub actions: Vec<DialogAction>,
    /// Follow-up suggestions from the primary handler.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Whether the primary handler ended the conversation.
    #[serde(default)]
    pub end_conversation: bool,
    /// Confidence of the primary handler (0 for fallback results).
    pub confidence: f64,
    /// Name of the primary handler, if any handler succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Per-handler diagnostics for this dispatch.
    #[serde(default)]
    pub outcomes: Vec<HandlerOutcome>,
    /// Whether this result came from the deterministic fallback path.
    #[serde(default)]
    pub is_fallback: bool,
}

impl DialogResult {
    /// The deterministic fallback result used when no handler can answer.
    #[must_use]
    pub fn fallback(intent: Intent, speech: impl Into<String>, retry_suggestion: impl Into<String>) -> Self {
        Self {
            turn_id: TurnId::new(),
            intent,
            speech: speech.into(),
            display_text: None,
            actions: Vec::new(),
            suggestions: vec![retry_suggestion.into()],
            end_conversation: false,
            confidence: 0.0,
            handler: None,
            outcomes: Vec::new(),
            is_fallback: true,
        }
    }
}
