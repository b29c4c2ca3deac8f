//! Message template rendering.
//!
//! Templates use `{placeholder}` slots filled from the triggering event
//! and the session context. Unresolvable placeholders are left verbatim
//! so a bad template degrades visibly instead of silently.
//!
//! Resolution order:
//! 1. dotted path into the event payload (`{zone}`, `{reading.value}`)
//! 2. event fields: `{device}`, `{event}`
//! 3. context fields: `{user.activity}`, `{user.mood}`, `{user.location}`,
//!    `{env.temperature}`, `{env.humidity}`, and `{memory.<key>}` for
//!    short-term memory

use std::sync::LazyLock;

use maru_core::context::ConversationContext;
use maru_core::event::DeviceEvent;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").unwrap_or_else(|_| unreachable!()));

/// Render a rule's message template against an event and context.
#[must_use]
pub fn render(template: &str, event: &DeviceEvent, context: &ConversationContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            resolve(name, event, context).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn resolve(name: &str, event: &DeviceEvent, context: &ConversationContext) -> Option<String> {
    if let Some(value) = lookup_path(&event.payload, name) {
        return Some(stringify(value));
    }
    match name {
        "device" => Some(event.device_id.to_string()),
        "event" => Some(event.event_type.clone()),
        "user.activity" => context.user_state.activity.clone(),
        "user.mood" => context.user_state.mood.clone(),
        "user.location" => context.user_state.location.clone(),
        "env.temperature" => context.environment_state.temperature.map(|t| t.to_string()),
        "env.humidity" => context.environment_state.humidity.map(|h| h.to_string()),
        _ => name
            .strip_prefix("memory.")
            .and_then(|key| context.short_term_memory.get(key))
            .map(stringify),
    }
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
