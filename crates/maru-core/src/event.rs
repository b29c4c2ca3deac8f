//! Device events (inbound) and dialog notifications (outbound).
//!
//! [`DeviceEvent`] is the transient record delivered by the event
//! transport; this core never persists it. [`DialogEvent`] is the
//! best-effort analytics notification emitted after each turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{DeviceId, SessionId, UserId};

/// An asynchronous event from an edge device or environment sensor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    /// Originating device.
    pub device_id: DeviceId,
    /// Event kind, e.g. `motion.detected` or `sensor.temperature`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Free-form event payload.
    #[serde(default)]
    pub payload: Value,
    /// When the device observed the event.
    pub timestamp: DateTime<Utc>,
}

impl DeviceEvent {
    /// Create an event stamped now.
    #[must_use]
    pub fn new(device_id: impl Into<DeviceId>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            device_id: device_id.into(),
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Fields shared by every dialog notification.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    /// User the notification concerns.
    pub user_id: UserId,
    /// When the notification was produced.
    pub timestamp: DateTime<Utc>,
}

impl BaseEvent {
    /// Create a base stamped now.
    #[must_use]
    pub fn now(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Outbound analytics notification. Fire-and-forget; never feeds back
/// into the dialog path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogEvent {
    /// A turn completed with a response.
    DialogCompleted {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Session the turn belonged to.
        session_id: SessionId,
        /// Resolved intent name.
        intent: String,
        /// Confidence of the returned response.
        confidence: f64,
        /// Primary handler, if any succeeded.
        handler: Option<String>,
        /// End-to-end turn latency.
        latency_ms: u64,
    },
    /// A proactive rule fired.
    ProactiveTriggered {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Rule that fired.
        rule: String,
        /// Device whose event triggered the rule.
        device_id: DeviceId,
    },
    /// A turn failed with a fatal error.
    TurnFailed {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Session the turn belonged to.
        session_id: SessionId,
        /// Error category string.
        category: String,
    },
}

impl DialogEvent {
    /// Event kind string (matches the serde tag).
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::DialogCompleted { .. } => "dialog_completed",
            Self::ProactiveTriggered { .. } => "proactive_triggered",
            Self::TurnFailed { .. } => "turn_failed",
        }
    }

    /// User the notification concerns.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::DialogCompleted { base, .. }
            | Self::ProactiveTriggered { base, .. }
            | Self::TurnFailed { base, .. } => &base.user_id,
        }
    }
}
