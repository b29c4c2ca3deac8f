//! The capability handler trait.
//!
//! Each handler declares the intents it answers and a numeric priority;
//! the registry and dispatcher own all selection logic. Handlers also
//! contribute [`ProactiveRule`]s at registration time.

use async_trait::async_trait;
use maru_core::context::ConversationContext;
use maru_core::intent::Intent;
use maru_core::response::PluginResponse;

use crate::rules::ProactiveRule;

/// A handler invocation failed.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PluginError(pub String);

impl PluginError {
    /// Create an error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The trait every capability handler implements.
///
/// Handlers are registered once at startup and shared immutably across
/// turns; `execute` may run concurrently with itself for different
/// sessions.
#[async_trait]
pub trait PluginHandler: Send + Sync {
    /// Handler name — used in logs, metrics, and diagnostics.
    fn name(&self) -> &str;

    /// Selection priority. Higher wins; ties keep registration order.
    fn priority(&self) -> i32 {
        0
    }

    /// Intent names this handler answers (dotted `capability.action`).
    fn supported_intents(&self) -> Vec<String>;

    /// Whether this handler can answer the intent given the context.
    /// Defaults to a declared-intent name match.
    fn can_handle(&self, intent: &Intent, _context: &ConversationContext) -> bool {
        self.supported_intents().iter().any(|i| i == &intent.name)
    }

    /// Answer the intent. May fail or exceed its deadline; the dispatcher
    /// isolates either from the turn.
    async fn execute(
        &self,
        intent: &Intent,
        context: &ConversationContext,
    ) -> Result<PluginResponse, PluginError>;

    /// Proactive rules this handler contributes. Read-only at runtime.
    fn proactive_rules(&self) -> Vec<ProactiveRule> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use maru_core::ids::SessionKey;

    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl PluginHandler for EchoHandler {
        fn name(&self) -> &str {
            "echo"
        }

        fn supported_intents(&self) -> Vec<String> {
            vec!["echo.say".to_string()]
        }

        async fn execute(
            &self,
            intent: &Intent,
            _context: &ConversationContext,
        ) -> Result<PluginResponse, PluginError> {
            Ok(PluginResponse::speech(intent.original_text.clone()))
        }
    }

    #[tokio::test]
    async fn default_can_handle_matches_declared_intents() {
        let handler = EchoHandler;
        let ctx = ConversationContext::new(SessionKey::new("u", "s"));
        assert!(handler.can_handle(&Intent::new("echo.say", 0.9, "x"), &ctx));
        assert!(!handler.can_handle(&Intent::new("weather.query", 0.9, "x"), &ctx));
        assert_eq!(handler.priority(), 0);
        assert!(handler.proactive_rules().is_empty());
    }

    #[tokio::test]
    async fn execute_returns_response() {
        let handler = EchoHandler;
        let ctx = ConversationContext::new(SessionKey::new("u", "s"));
        let resp = handler
            .execute(&Intent::new("echo.say", 0.9, "hello"), &ctx)
            .await
            .unwrap();
        assert_eq!(resp.speech, "hello");
    }
}
