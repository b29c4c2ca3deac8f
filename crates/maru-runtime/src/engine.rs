//! The dialog engine: one utterance in, one result out.
//!
//! Pipeline per user turn: fetch-or-create context, resolve intent,
//! fan out to candidate handlers, aggregate, persist the turn pair,
//! publish analytics. The whole pipeline runs under an end-to-end
//! deadline; blowing it yields the deterministic fallback, never an
//! unanswered user.

use std::sync::Arc;

use maru_context::ContextManager;
use maru_core::context::{ContextDelta, DialogTurn, UserStatePatch};
use maru_core::errors::DialogError;
use maru_core::event::{BaseEvent, DeviceEvent, DialogEvent};
use maru_core::ids::SessionKey;
use maru_core::intent::Intent;
use maru_core::response::DialogResult;
use maru_nlu::{IntentResolver, NluClient};
use maru_plugins::{PluginDispatcher, PluginRegistry};
use maru_proactive::{ProactiveEngine, ProactiveFire};
use metrics::{counter, histogram};
use tokio::time::{Instant, timeout};
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::publisher::EventPublisher;

/// Orchestrates the full dialog pipeline. One instance serves all
/// sessions; construct it once at startup and share it behind an [`Arc`].
pub struct DialogEngine {
    config: EngineConfig,
    context: Arc<ContextManager>,
    resolver: IntentResolver,
    registry: Arc<PluginRegistry>,
    dispatcher: Arc<PluginDispatcher>,
    proactive: ProactiveEngine,
    publisher: EventPublisher,
}

impl DialogEngine {
    /// Wire up an engine. The registry is frozen from this point on.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        context: Arc<ContextManager>,
        nlu: Arc<dyn NluClient>,
        registry: PluginRegistry,
    ) -> Self {
        let registry = Arc::new(registry);
        let dispatcher = Arc::new(PluginDispatcher::new(config.dispatcher_config()));
        let proactive = ProactiveEngine::new(
            Arc::clone(&context),
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
        );
        let publisher = EventPublisher::new(config.event_queue_capacity);
        Self {
            config,
            context,
            resolver: IntentResolver::new(nlu),
            registry,
            dispatcher,
            proactive,
            publisher,
        }
    }

    /// Subscribe to the analytics event stream.
    #[must_use]
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<DialogEvent> {
        self.publisher.subscribe()
    }

    /// Process one user utterance end to end.
    ///
    /// Infallible except for fatal context loss: degraded NLU, failed or
    /// slow handlers, and the end-to-end deadline all collapse into the
    /// deterministic fallback result.
    #[instrument(skip(self, text), fields(key = %key))]
    pub async fn handle_utterance(
        &self,
        key: &SessionKey,
        text: &str,
    ) -> Result<DialogResult, DialogError> {
        let started = Instant::now();
        let outcome = timeout(self.config.turn_deadline(), self.run_turn(key, text)).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        histogram!("dialog_turn_latency_ms").record(latency_ms as f64);

        match outcome {
            Ok(Ok(result)) => {
                self.publisher.emit(DialogEvent::DialogCompleted {
                    base: BaseEvent::now(key.user_id.clone()),
                    session_id: key.session_id.clone(),
                    intent: result.intent.name.clone(),
                    confidence: result.confidence,
                    handler: result.handler.clone(),
                    latency_ms,
                });
                info!(intent = %result.intent.name, handler = ?result.handler, latency_ms, "turn completed");
                Ok(result)
            }
            Ok(Err(e)) => {
                error!(error = %e, "turn failed");
                counter!("dialog_turns", "outcome" => "failed").increment(1);
                self.publisher.emit(DialogEvent::TurnFailed {
                    base: BaseEvent::now(key.user_id.clone()),
                    session_id: key.session_id.clone(),
                    category: e.category().to_string(),
                });
                Err(e)
            }
            Err(_) => {
                warn!(deadline_ms = self.config.turn_deadline_ms, "turn deadline exceeded");
                counter!("dialog_turns", "outcome" => "deadline").increment(1);
                self.publisher.emit(DialogEvent::TurnFailed {
                    base: BaseEvent::now(key.user_id.clone()),
                    session_id: key.session_id.clone(),
                    category: "deadline_exceeded".to_string(),
                });
                Ok(DialogResult::fallback(
                    Intent::unknown(text),
                    self.config.fallback_speech.clone(),
                    self.config.fallback_suggestion.clone(),
                ))
            }
        }
    }

    /// The pipeline body, run under the turn deadline.
    async fn run_turn(&self, key: &SessionKey, text: &str) -> Result<DialogResult, DialogError> {
        let context = self.context.get_or_create(key).await?;
        let intent = self.resolver.resolve(text, &context).await;
        let candidates = self.registry.candidates_for(&intent, &context);
        let dispatched = self.dispatcher.dispatch(&intent, &context, &candidates).await;

        let result = dispatched.result;
        let response_turn = if result.is_fallback {
            DialogTurn::assistant(result.speech.clone(), result.intent.name.clone(), 0.0)
        } else {
            DialogTurn::assistant(
                result.speech.clone(),
                result.intent.name.clone(),
                result.confidence,
            )
        };

        let mut delta = ContextDelta::with_turn(DialogTurn::user(text)).and_turn(response_turn);
        delta.short_term = dispatched.context_update;
        if !intent.is_unknown() {
            delta = delta.and_user_state(UserStatePatch {
                recent_topics: vec![intent.capability().to_string()],
                ..UserStatePatch::default()
            });
        }
        let _ = self.context.update(key, delta).await?;

        let outcome = if result.is_fallback { "fallback" } else { "answered" };
        counter!("dialog_turns", "outcome" => outcome).increment(1);
        Ok(result)
    }

    /// Run the proactive path for one device event and publish a
    /// notification per fired rule.
    #[instrument(skip(self, event), fields(device = %event.device_id))]
    pub async fn process_device_event(
        &self,
        event: &DeviceEvent,
    ) -> Result<Vec<ProactiveFire>, DialogError> {
        let fires = self.proactive.handle_event(event).await?;
        for fire in &fires {
            self.publisher.emit(DialogEvent::ProactiveTriggered {
                base: BaseEvent::now(fire.key.user_id.clone()),
                rule: fire.rule.clone(),
                device_id: fire.device_id.clone(),
            });
            info!(rule = %fire.rule, "proactive message fired");
        }
        Ok(fires)
    }

    /// Fire-and-forget entry point for the event transport: evaluation
    /// runs off the dialog path, and failures are logged, not surfaced.
    pub fn handle_device_event(self: &Arc<Self>, event: DeviceEvent) {
        let engine = Arc::clone(self);
        drop(tokio::spawn(async move {
            if let Err(e) = engine.process_device_event(&event).await {
                warn!(device = %event.device_id, error = %e, "proactive evaluation failed");
            }
        }));
    }
}
