//! Concurrent handler fan-out and single-primary aggregation.
//!
//! Every candidate runs under its own deadline; a slow or failing
//! handler costs the turn nothing but its own absence. Aggregation is
//! deterministic: highest confidence wins, ties go to the earlier
//! candidate (higher priority, then registration order).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use maru_core::context::ConversationContext;
use maru_core::ids::TurnId;
use maru_core::intent::Intent;
use maru_core::response::{DialogResult, HandlerOutcome, HandlerStatus, PluginResponse};
use metrics::counter;
use serde_json::Value;
use tokio::time::{Instant, timeout};
use tracing::{debug, instrument, warn};

use crate::handler::PluginHandler;

/// Default per-handler execution deadline.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(3);

/// Dispatcher tuning.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Deadline applied to each handler invocation independently.
    pub handler_timeout: Duration,
    /// Speech used when no handler produces a response.
    pub fallback_speech: String,
    /// Retry suggestion attached to fallback responses.
    pub fallback_suggestion: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            fallback_speech: "죄송해요, 지금은 도와드릴 수 없어요.".to_string(),
            fallback_suggestion: "다시 한번 말씀해 주세요.".to_string(),
        }
    }
}

/// Output of one dispatch: the aggregated result plus the primary
/// handler's context update, which the caller merges into short-term
/// memory. Secondary updates are discarded.
#[derive(Debug)]
pub struct Dispatched {
    /// Aggregated turn result.
    pub result: DialogResult,
    /// Context-update entries from the primary handler only.
    pub context_update: HashMap<String, Value>,
}

/// Runs candidate handlers concurrently and aggregates their responses.
pub struct PluginDispatcher {
    config: DispatcherConfig,
}

impl PluginDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Fan the intent out to `candidates` and aggregate.
    ///
    /// `candidates` must already be in selection order (priority
    /// descending, ties in registration order); aggregation ties break
    /// toward the earlier entry.
    #[instrument(skip_all, fields(intent = %intent.name, candidates = candidates.len()))]
    pub async fn dispatch(
        &self,
        intent: &Intent,
        context: &ConversationContext,
        candidates: &[Arc<dyn PluginHandler>],
    ) -> Dispatched {
        if candidates.is_empty() {
            warn!(intent = %intent.name, "no candidate handler");
            counter!("plugin_dispatch", "outcome" => "no_candidate").increment(1);
            return self.fallback(intent.clone(), Vec::new());
        }

        let shared_intent = Arc::new(intent.clone());
        let shared_context = Arc::new(context.clone());
        let deadline = self.config.handler_timeout;

        let tasks: Vec<_> = candidates
            .iter()
            .map(|handler| {
                let handler = Arc::clone(handler);
                let intent = Arc::clone(&shared_intent);
                let context = Arc::clone(&shared_context);
                tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome = timeout(deadline, handler.execute(&intent, &context)).await;
                    (started.elapsed(), outcome)
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(candidates.len());
        let mut successes: Vec<(usize, PluginResponse)> = Vec::new();

        for (index, (handler, task)) in candidates.iter().zip(tasks).enumerate() {
            let name = handler.name().to_string();
            match task.await {
                Ok((elapsed, Ok(Ok(mut response)))) => {
                    response.confidence = response.confidence.clamp(0.0, 1.0);
                    counter!("plugin_dispatch", "outcome" => "success").increment(1);
                    outcomes.push(HandlerOutcome {
                        handler: name,
                        status: HandlerStatus::Success,
                        latency_ms: elapsed.as_millis() as u64,
                    });
                    successes.push((index, response));
                }
                Ok((elapsed, Ok(Err(e)))) => {
                    warn!(handler = %name, error = %e, "handler failed");
                    counter!("plugin_dispatch", "outcome" => "failed").increment(1);
                    outcomes.push(HandlerOutcome {
                        handler: name,
                        status: HandlerStatus::Failed,
                        latency_ms: elapsed.as_millis() as u64,
                    });
                }
                Ok((elapsed, Err(_))) => {
                    warn!(handler = %name, timeout_ms = deadline.as_millis() as u64, "handler timed out");
                    counter!("plugin_dispatch", "outcome" => "timeout").increment(1);
                    outcomes.push(HandlerOutcome {
                        handler: name,
                        status: HandlerStatus::TimedOut,
                        latency_ms: elapsed.as_millis() as u64,
                    });
                }
                Err(join_error) => {
                    warn!(handler = %name, error = %join_error, "handler task aborted");
                    counter!("plugin_dispatch", "outcome" => "failed").increment(1);
                    outcomes.push(HandlerOutcome {
                        handler: name,
                        status: HandlerStatus::Failed,
                        latency_ms: deadline.as_millis() as u64,
                    });
                }
            }
        }

        let Some(primary_index) = pick_primary(&successes) else {
            return self.fallback(intent.clone(), outcomes);
        };

        // Primary's actions first, then the other successes in candidate
        // order. Only the primary's context update survives.
        let primary_name = candidates[successes[primary_index].0].name().to_string();
        let mut actions = Vec::new();
        let mut secondary_actions = Vec::new();
        for (slot, (_, response)) in successes.iter().enumerate() {
            if slot == primary_index {
                actions.extend(response.actions.iter().cloned());
            } else {
                secondary_actions.extend(response.actions.iter().cloned());
            }
        }
        actions.extend(secondary_actions);

        let (_, primary) = successes.swap_remove(primary_index);
        debug!(handler = %primary_name, confidence = primary.confidence, "dispatch complete");

        Dispatched {
            result: DialogResult {
                turn_id: TurnId::new(),
                intent: intent.clone(),
                speech: primary.speech,
                display_text: primary.display_text,
                actions,
                suggestions: primary.suggestions,
                end_conversation: primary.end_conversation,
                confidence: primary.confidence,
                handler: Some(primary_name),
                outcomes,
                is_fallback: false,
            },
            context_update: primary.context_update,
        }
    }

    fn fallback(&self, intent: Intent, outcomes: Vec<HandlerOutcome>) -> Dispatched {
        counter!("plugin_dispatch", "outcome" => "fallback").increment(1);
        let mut result = DialogResult::fallback(
            intent,
            self.config.fallback_speech.clone(),
            self.config.fallback_suggestion.clone(),
        );
        result.outcomes = outcomes;
        Dispatched {
            result,
            context_update: HashMap::new(),
        }
    }
}

/// Index (into `successes`) of the winning response: strictly greater
/// confidence wins, so ties resolve to the earliest candidate.
fn pick_primary(successes: &[(usize, PluginResponse)]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (slot, (_, response)) in successes.iter().enumerate() {
        match best {
            None => best = Some(slot),
            Some(current) if response.confidence > successes[current].1.confidence => {
                best = Some(slot);
            }
            Some(_) => {}
        }
    }
    best
}
