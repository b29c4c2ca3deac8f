//! Proactive rule declarations.
//!
//! Rules are registered statically by each handler at startup and are
//! read-only at runtime. The cooldown window is mandatory per-rule
//! configuration; there is no global default.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use maru_core::context::ConversationContext;
use maru_core::event::DeviceEvent;
use serde::{Deserialize, Serialize};

/// Rule priority ordinal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePriority {
    /// Informational, can be skipped under load.
    Low,
    /// Normal proactive messages.
    Medium,
    /// Time-sensitive messages.
    High,
    /// Safety-relevant messages.
    Critical,
}

type TriggerFn = dyn Fn(&DeviceEvent, &ConversationContext) -> bool + Send + Sync;

/// One proactive trigger declaration.
#[derive(Clone)]
pub struct ProactiveRule {
    /// Unique rule name (also the suffix of the synthesized intent).
    pub name: String,
    /// Priority ordinal.
    pub priority: RulePriority,
    /// Message template with `{placeholder}` slots rendered at fire time.
    pub message_template: String,
    /// Per-user re-fire suppression window. Mandatory.
    pub cooldown: Duration,
    trigger: Arc<TriggerFn>,
}

impl ProactiveRule {
    /// Declare a rule.
    pub fn new(
        name: impl Into<String>,
        priority: RulePriority,
        message_template: impl Into<String>,
        cooldown: Duration,
        trigger: impl Fn(&DeviceEvent, &ConversationContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            message_template: message_template.into(),
            cooldown,
            trigger: Arc::new(trigger),
        }
    }

    /// Evaluate the trigger predicate.
    #[must_use]
    pub fn matches(&self, event: &DeviceEvent, context: &ConversationContext) -> bool {
        (self.trigger)(event, context)
    }
}

impl fmt::Debug for ProactiveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProactiveRule")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use maru_core::ids::SessionKey;
    use serde_json::json;

    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(RulePriority::Low < RulePriority::Medium);
        assert!(RulePriority::Medium < RulePriority::High);
        assert!(RulePriority::High < RulePriority::Critical);
    }

    #[test]
    fn trigger_sees_event_and_context() {
        let rule = ProactiveRule::new(
            "morning_greeting",
            RulePriority::Medium,
            "좋은 아침이에요!",
            Duration::from_secs(24 * 60 * 60),
            |event, context| {
                event.event_type == "motion.detected" && context.history.is_empty()
            },
        );

        let ctx = ConversationContext::new(SessionKey::new("u", "s"));
        let motion = DeviceEvent::new("sensor-1", "motion.detected", json!({}));
        let door = DeviceEvent::new("sensor-1", "door.open", json!({}));
        assert!(rule.matches(&motion, &ctx));
        assert!(!rule.matches(&door, &ctx));
    }

    #[test]
    fn debug_omits_trigger() {
        let rule = ProactiveRule::new(
            "r",
            RulePriority::Low,
            "t",
            Duration::from_secs(1),
            |_, _| true,
        );
        let debug = format!("{rule:?}");
        assert!(debug.contains("\"r\""));
        assert!(!debug.contains("trigger"));
    }
}
