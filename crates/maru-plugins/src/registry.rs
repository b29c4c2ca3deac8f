//! Handler registry with deterministic candidate selection.
//!
//! Registration happens at startup only; the registry is shared
//! immutably afterwards. Candidate order is the selection contract:
//! priority descending, ties in registration order.

use std::cmp::Reverse;
use std::sync::Arc;

use maru_core::context::ConversationContext;
use maru_core::intent::Intent;
use tracing::debug;

use crate::handler::PluginHandler;
use crate::rules::ProactiveRule;

/// Ordered collection of registered capability handlers.
#[derive(Default)]
pub struct PluginRegistry {
    handlers: Vec<Arc<dyn PluginHandler>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Registration order breaks priority ties.
    pub fn register(&mut self, handler: Arc<dyn PluginHandler>) {
        debug!(
            handler = handler.name(),
            priority = handler.priority(),
            intents = ?handler.supported_intents(),
            "registered plugin handler"
        );
        self.handlers.push(handler);
    }

    /// Handlers able to answer `intent`, ordered by priority descending.
    /// Equal priorities keep registration order (the sort is stable).
    #[must_use]
    pub fn candidates_for(
        &self,
        intent: &Intent,
        context: &ConversationContext,
    ) -> Vec<Arc<dyn PluginHandler>> {
        let mut candidates: Vec<Arc<dyn PluginHandler>> = self
            .handlers
            .iter()
            .filter(|h| h.can_handle(intent, context))
            .cloned()
            .collect();
        candidates.sort_by_key(|h| Reverse(h.priority()));
        candidates
    }

    /// All proactive rules contributed by registered handlers.
    #[must_use]
    pub fn all_rules(&self) -> Vec<ProactiveRule> {
        self.handlers
            .iter()
            .flat_map(|h| h.proactive_rules())
            .collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
