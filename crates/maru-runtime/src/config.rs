//! Runtime configuration.
//!
//! Deserialized from JSON (every field optional, with production
//! defaults) and projected into the per-component configs downstream
//! crates expect.

use std::time::Duration;

use maru_context::ContextConfig;
use maru_plugins::DispatcherConfig;
use serde::Deserialize;

/// Top-level engine configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Per-handler execution deadline.
    pub handler_timeout_ms: u64,
    /// End-to-end deadline for one user turn. Must exceed
    /// `handler_timeout_ms` or every slow turn degenerates to fallback.
    pub turn_deadline_ms: u64,
    /// Sliding fast-tier TTL for contexts.
    pub cache_ttl_secs: u64,
    /// Bounded analytics-event queue depth. Events beyond this are dropped.
    pub event_queue_capacity: usize,
    /// Speech used when no handler produces a response.
    pub fallback_speech: String,
    /// Retry suggestion attached to fallback responses.
    pub fallback_suggestion: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 3_000,
            turn_deadline_ms: 10_000,
            cache_ttl_secs: 24 * 60 * 60,
            event_queue_capacity: 256,
            fallback_speech: "죄송해요, 지금은 도와드릴 수 없어요.".to_string(),
            fallback_suggestion: "다시 한번 말씀해 주세요.".to_string(),
        }
    }
}

impl EngineConfig {
    /// Per-handler deadline as a [`Duration`].
    #[must_use]
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Whole-turn deadline as a [`Duration`].
    #[must_use]
    pub fn turn_deadline(&self) -> Duration {
        Duration::from_millis(self.turn_deadline_ms)
    }

    /// Dispatcher projection of this config.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            handler_timeout: self.handler_timeout(),
            fallback_speech: self.fallback_speech.clone(),
            fallback_suggestion: self.fallback_suggestion.clone(),
        }
    }

    /// Context-manager projection of this config.
    #[must_use]
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}
