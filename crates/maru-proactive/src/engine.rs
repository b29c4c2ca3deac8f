//! The proactive rule engine.
//!
//! One device event can fire any number of rules. Each fire synthesizes
//! a `proactive.<rule>` intent (skipping the resolver entirely),
//! dispatches it to whatever handlers claim it, records a proactive turn
//! in the session context, and hands the result back for delivery.
//!
//! Evaluation never runs on the user-dialog path: the runtime spawns
//! [`ProactiveEngine::handle_event`] per inbound event, and each rule is
//! evaluated on its own task so one slow trigger or handler cannot delay
//! the rest.

use std::collections::HashMap;
use std::sync::Arc;

use maru_context::ContextManager;
use maru_core::context::{ContextDelta, ConversationContext, DialogTurn};
use maru_core::errors::DialogError;
use maru_core::event::DeviceEvent;
use maru_core::ids::{DeviceId, SessionKey, TurnId};
use maru_core::intent::Intent;
use maru_core::response::DialogResult;
use maru_plugins::{PluginDispatcher, PluginRegistry, ProactiveRule};
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::cooldown::CooldownTracker;
use crate::template;

/// One fired rule, ready for delivery by the runtime.
#[derive(Debug)]
pub struct ProactiveFire {
    /// Rule that fired.
    pub rule: String,
    /// Device whose event triggered the rule.
    pub device_id: DeviceId,
    /// Session the proactive turn was recorded in.
    pub key: SessionKey,
    /// The turn result to deliver.
    pub result: DialogResult,
}

/// Matches device events against registered rules and runs the
/// proactive dialog path for each fire.
pub struct ProactiveEngine {
    context: Arc<ContextManager>,
    registry: Arc<PluginRegistry>,
    dispatcher: Arc<PluginDispatcher>,
    /// Snapshot of handler rules, priority descending. Rules are static
    /// after startup.
    rules: Vec<ProactiveRule>,
    cooldowns: Arc<CooldownTracker>,
}

impl ProactiveEngine {
    /// Create an engine over the registered handlers' rules.
    #[must_use]
    pub fn new(
        context: Arc<ContextManager>,
        registry: Arc<PluginRegistry>,
        dispatcher: Arc<PluginDispatcher>,
    ) -> Self {
        let mut rules = registry.all_rules();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            context,
            registry,
            dispatcher,
            rules,
            cooldowns: Arc::new(CooldownTracker::new()),
        }
    }

    /// Evaluate all rules against one device event.
    ///
    /// Every rule gets its own task, so a slow trigger or handler only
    /// delays its own fire. Returns the fires that passed trigger and
    /// cooldown (in rule-priority order), each already recorded in the
    /// session context. An event with no associated session, or no
    /// matching rule, returns an empty vec.
    #[instrument(skip(self, event), fields(device = %event.device_id, event_type = %event.event_type))]
    pub async fn handle_event(&self, event: &DeviceEvent) -> Result<Vec<ProactiveFire>, DialogError> {
        if self.rules.is_empty() {
            return Ok(Vec::new());
        }

        let Some(context) = self.context.get_by_device(&event.device_id).await? else {
            debug!("no session associated with device, skipping");
            return Ok(Vec::new());
        };

        let event = Arc::new(event.clone());
        let context = Arc::new(context);
        let tasks: Vec<_> = self
            .rules
            .iter()
            .cloned()
            .map(|rule| {
                let event = Arc::clone(&event);
                let context = Arc::clone(&context);
                let cooldowns = Arc::clone(&self.cooldowns);
                let manager = Arc::clone(&self.context);
                let registry = Arc::clone(&self.registry);
                let dispatcher = Arc::clone(&self.dispatcher);
                tokio::spawn(async move {
                    if !rule.matches(&event, &context) {
                        return None;
                    }
                    if !cooldowns.try_fire(&rule.name, &context.user_id, rule.cooldown) {
                        debug!(rule = %rule.name, "suppressed by cooldown");
                        counter!("proactive_rules", "outcome" => "cooldown").increment(1);
                        return None;
                    }
                    match fire_rule(&manager, &registry, &dispatcher, &rule, &event, &context).await
                    {
                        Ok(fire) => {
                            counter!("proactive_rules", "outcome" => "fired").increment(1);
                            Some(fire)
                        }
                        Err(e) => {
                            // Cooldown stands: better a missed message than a storm.
                            warn!(rule = %rule.name, error = %e, "proactive fire failed");
                            counter!("proactive_rules", "outcome" => "error").increment(1);
                            None
                        }
                    }
                })
            })
            .collect();

        let mut fires = Vec::new();
        for task in tasks {
            match task.await {
                Ok(Some(fire)) => fires.push(fire),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "proactive rule task panicked"),
            }
        }
        Ok(fires)
    }
}

/// Run the proactive dialog path for one fired rule.
async fn fire_rule(
    manager: &ContextManager,
    registry: &PluginRegistry,
    dispatcher: &PluginDispatcher,
    rule: &ProactiveRule,
    event: &DeviceEvent,
    context: &ConversationContext,
) -> Result<ProactiveFire, DialogError> {
    let message = template::render(&rule.message_template, event, context);
    let intent = Intent::proactive(&rule.name, message.clone());

    let candidates = registry.candidates_for(&intent, context);
    let (result, context_update) = if candidates.is_empty() {
        // No handler claims the synthesized intent: the rendered
        // template itself is the message.
        (direct_result(intent, message), HashMap::new())
    } else {
        let dispatched = dispatcher.dispatch(&intent, context, &candidates).await;
        if dispatched.result.is_fallback {
            (direct_result(intent, message), HashMap::new())
        } else {
            (dispatched.result, dispatched.context_update)
        }
    };

    let key = context.key();
    let turn = DialogTurn::proactive(result.speech.clone(), result.intent.name.clone());
    let mut delta = ContextDelta::with_turn(turn);
    delta.short_term = context_update;
    let _ = manager.update(&key, delta).await?;

    Ok(ProactiveFire {
        rule: rule.name.clone(),
        device_id: event.device_id.clone(),
        key,
        result,
    })
}

/// A result delivered straight from the rendered template.
fn direct_result(intent: Intent, message: String) -> DialogResult {
    DialogResult {
        turn_id: TurnId::new(),
        intent,
        speech: message,
        display_text: None,
        actions: Vec::new(),
        suggestions: Vec::new(),
        end_conversation: false,
        confidence: 1.0,
        handler: None,
        outcomes: Vec::new(),
        is_fallback: false,
    }
}
