//! Intent resolver — the boundary that never throws.
//!
//! Wraps the NLU collaborator and normalizes its result into a canonical
//! [`Intent`]. On collaborator failure it falls back to the local
//! matcher; if that also fails, the zero-confidence `unknown` intent is
//! returned so the pipeline can still reach its deterministic fallback.

use std::sync::Arc;

use maru_core::context::ConversationContext;
use maru_core::errors::DialogError;
use maru_core::intent::Intent;
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::client::{NluClient, NluRequest};
use crate::matcher::LocalMatcher;

/// Resolves utterances into canonical intents.
pub struct IntentResolver {
    client: Arc<dyn NluClient>,
    matcher: LocalMatcher,
}

impl IntentResolver {
    /// Create a resolver over an NLU client.
    pub fn new(client: Arc<dyn NluClient>) -> Self {
        Self {
            client,
            matcher: LocalMatcher::new(),
        }
    }

    /// Resolve one utterance. Infallible by contract: the worst case is
    /// `Intent::unknown` with confidence 0.
    #[instrument(skip(self, context), fields(user = %context.user_id))]
    pub async fn resolve(&self, text: &str, context: &ConversationContext) -> Intent {
        let request = NluRequest {
            text: text.to_string(),
            language_code: context.user_state.language.clone(),
            recent_topics: context.user_state.recent_topics.clone(),
        };

        match self.client.analyze(&request).await {
            Ok(Some(analysis)) => {
                counter!("intent_resolution", "source" => "nlu").increment(1);
                Intent::new(analysis.intent_name, analysis.confidence, text)
                    .with_parameters(analysis.entities)
            }
            Ok(None) => {
                debug!("NLU found no intent");
                counter!("intent_resolution", "source" => "none").increment(1);
                Intent::unknown(text)
            }
            Err(e) => {
                let degraded = DialogError::IntentResolutionDegraded(e.to_string());
                warn!(error = %degraded, "falling back to local matcher");
                match self.matcher.resolve(text) {
                    Some(intent) => {
                        counter!("intent_resolution", "source" => "local").increment(1);
                        intent
                    }
                    None => {
                        counter!("intent_resolution", "source" => "unknown").increment(1);
                        Intent::unknown(text)
                    }
                }
            }
        }
    }
}
