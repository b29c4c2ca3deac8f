//! End-to-end pipeline tests over in-memory tiers and stub collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use maru_context::enrichment::Enricher;
use maru_context::manager::{ContextConfig, ContextManager};
use maru_context::memory::{MemoryCache, MemoryDurable};
use maru_context::tiers::{CacheTier, DurableTier};
use maru_core::context::{ConversationContext, TurnRole, MAX_HISTORY};
use maru_core::event::{DeviceEvent, DialogEvent};
use maru_core::ids::{DeviceId, SessionKey};
use maru_core::intent::Intent;
use maru_core::response::{HandlerStatus, PluginResponse};
use maru_nlu::{NluAnalysis, NluClient, NluError, NluRequest};
use maru_plugins::{
    PluginError, PluginHandler, PluginRegistry, ProactiveRule, RulePriority,
};
use maru_runtime::{DialogEngine, EngineConfig};
use serde_json::json;

// ── Stub collaborators ──────────────────────────────────────────────

/// NLU stub answering from a fixed utterance table.
struct TableNlu {
    table: HashMap<&'static str, NluAnalysis>,
}

impl TableNlu {
    fn weather() -> Self {
        let mut table = HashMap::new();
        let _ = table.insert(
            "오늘 날씨 어때?",
            NluAnalysis {
                intent_name: "weather.query".to_string(),
                confidence: 0.95,
                entities: HashMap::from([("date".to_string(), json!("today"))]),
            },
        );
        Self { table }
    }
}

#[async_trait]
impl NluClient for TableNlu {
    async fn analyze(&self, request: &NluRequest) -> Result<Option<NluAnalysis>, NluError> {
        Ok(self.table.get(request.text.as_str()).cloned())
    }
}

/// NLU stub that is always down.
struct DownNlu;

#[async_trait]
impl NluClient for DownNlu {
    async fn analyze(&self, _request: &NluRequest) -> Result<Option<NluAnalysis>, NluError> {
        Err(NluError::Status(503))
    }
}

/// NLU stub that never answers within any reasonable deadline.
struct StuckNlu;

#[async_trait]
impl NluClient for StuckNlu {
    async fn analyze(&self, _request: &NluRequest) -> Result<Option<NluAnalysis>, NluError> {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Ok(None)
    }
}

struct WeatherHandler;

#[async_trait]
impl PluginHandler for WeatherHandler {
    fn name(&self) -> &str {
        "weather"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn supported_intents(&self) -> Vec<String> {
        vec!["weather.query".to_string()]
    }

    async fn execute(
        &self,
        intent: &Intent,
        _context: &ConversationContext,
    ) -> Result<PluginResponse, PluginError> {
        let date = intent
            .parameters
            .get("date")
            .and_then(|v| v.as_str())
            .unwrap_or("today");
        Ok(PluginResponse::speech("오늘은 맑고 22도예요.")
            .with_confidence(0.9)
            .with_context_update("lastWeatherQuery", json!(date))
            .with_suggestion("내일 날씨도 알려드릴까요?"))
    }
}

/// Lower-priority generalist that also claims weather queries.
struct SmallTalkHandler;

#[async_trait]
impl PluginHandler for SmallTalkHandler {
    fn name(&self) -> &str {
        "small_talk"
    }

    fn supported_intents(&self) -> Vec<String> {
        vec!["weather.query".to_string(), "greeting.hello".to_string()]
    }

    async fn execute(
        &self,
        _intent: &Intent,
        _context: &ConversationContext,
    ) -> Result<PluginResponse, PluginError> {
        Ok(PluginResponse::speech("날씨 얘기 좋죠!").with_confidence(0.4))
    }
}

/// Never answers inside the handler deadline.
struct SlowHandler;

#[async_trait]
impl PluginHandler for SlowHandler {
    fn name(&self) -> &str {
        "slow"
    }

    fn priority(&self) -> i32 {
        99
    }

    fn supported_intents(&self) -> Vec<String> {
        vec!["weather.query".to_string()]
    }

    async fn execute(
        &self,
        _intent: &Intent,
        _context: &ConversationContext,
    ) -> Result<PluginResponse, PluginError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(PluginResponse::speech("too late")
            .with_context_update("slowWasHere", json!(true)))
    }
}

struct GreeterHandler;

#[async_trait]
impl PluginHandler for GreeterHandler {
    fn name(&self) -> &str {
        "greeter"
    }

    fn supported_intents(&self) -> Vec<String> {
        vec!["greeting.hello".to_string()]
    }

    async fn execute(
        &self,
        _intent: &Intent,
        _context: &ConversationContext,
    ) -> Result<PluginResponse, PluginError> {
        Ok(PluginResponse::speech("안녕하세요!").with_confidence(0.85))
    }

    fn proactive_rules(&self) -> Vec<ProactiveRule> {
        vec![ProactiveRule::new(
            "morning_greeting",
            RulePriority::Medium,
            "좋은 아침이에요!",
            Duration::from_secs(3600),
            |event, _| event.event_type == "motion.detected",
        )]
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    engine: Arc<DialogEngine>,
    durable: Arc<MemoryDurable>,
}

fn build(nlu: Arc<dyn NluClient>, handlers: Vec<Arc<dyn PluginHandler>>) -> Harness {
    build_with_config(EngineConfig::default(), nlu, handlers)
}

fn build_with_config(
    config: EngineConfig,
    nlu: Arc<dyn NluClient>,
    handlers: Vec<Arc<dyn PluginHandler>>,
) -> Harness {
    let cache = Arc::new(MemoryCache::new());
    let durable = Arc::new(MemoryDurable::new());
    let manager = Arc::new(ContextManager::new(
        cache as Arc<dyn CacheTier>,
        Arc::clone(&durable) as Arc<dyn DurableTier>,
        Enricher::new(),
        config.context_config(),
    ));
    let mut registry = PluginRegistry::new();
    for handler in handlers {
        registry.register(handler);
    }
    Harness {
        engine: Arc::new(DialogEngine::new(config, manager, nlu, registry)),
        durable,
    }
}

fn key() -> SessionKey {
    SessionKey::new("user-1", "session-1")
}

// ── User turns ──────────────────────────────────────────────────────

#[tokio::test]
async fn weather_turn_end_to_end() {
    let harness = build(
        Arc::new(TableNlu::weather()),
        vec![Arc::new(SmallTalkHandler), Arc::new(WeatherHandler)],
    );
    let mut events = harness.engine.subscribe_events();

    let result = harness
        .engine
        .handle_utterance(&key(), "오늘 날씨 어때?")
        .await
        .unwrap();

    assert_eq!(result.speech, "오늘은 맑고 22도예요.");
    assert_eq!(result.handler.as_deref(), Some("weather"));
    assert_eq!(result.confidence, 0.9);
    assert_eq!(result.intent.name, "weather.query");
    assert!(!result.is_fallback);
    assert_eq!(result.suggestions, vec!["내일 날씨도 알려드릴까요?"]);

    // Both turns and the primary's context update are observable.
    let second = harness
        .engine
        .handle_utterance(&key(), "오늘 날씨 어때?")
        .await
        .unwrap();
    assert!(!second.is_fallback);

    let event = events.recv().await.unwrap();
    match event {
        DialogEvent::DialogCompleted {
            intent, handler, confidence, ..
        } => {
            assert_eq!(intent, "weather.query");
            assert_eq!(handler.as_deref(), Some("weather"));
            assert_eq!(confidence, 0.9);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn turn_records_user_and_assistant_turns() {
    let harness = build(Arc::new(TableNlu::weather()), vec![Arc::new(WeatherHandler)]);
    let _ = harness
        .engine
        .handle_utterance(&key(), "오늘 날씨 어때?")
        .await
        .unwrap();

    // The durable write is backgrounded; poll briefly.
    let mut stored = None;
    for _ in 0..50 {
        stored = harness.durable.load(&key()).await.unwrap();
        if stored.as_ref().is_some_and(|c| c.history.len() == 2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let context = stored.expect("context persisted");
    assert_eq!(context.history.len(), 2);
    assert_eq!(context.history[0].role, TurnRole::User);
    assert_eq!(context.history[0].text, "오늘 날씨 어때?");
    assert_eq!(context.history[1].role, TurnRole::Assistant);
    assert_eq!(context.history[1].intent.as_deref(), Some("weather.query"));
    assert_eq!(context.short_term_memory["lastWeatherQuery"], json!("today"));
    assert_eq!(context.user_state.recent_topics, vec!["weather"]);
}

#[tokio::test(start_paused = true)]
async fn timed_out_handler_loses_to_a_live_one() {
    let harness = build(
        Arc::new(TableNlu::weather()),
        vec![Arc::new(SlowHandler), Arc::new(SmallTalkHandler)],
    );
    let result = harness
        .engine
        .handle_utterance(&key(), "오늘 날씨 어때?")
        .await
        .unwrap();

    assert_eq!(result.handler.as_deref(), Some("small_talk"));
    assert_eq!(result.confidence, 0.4);
    let slow = result
        .outcomes
        .iter()
        .find(|o| o.handler == "slow")
        .unwrap();
    assert_eq!(slow.status, HandlerStatus::TimedOut);

    // The timed-out handler's context update must not leak into state.
    if let Some(context) = harness.durable.load(&key()).await.unwrap() {
        assert!(!context.short_term_memory.contains_key("slowWasHere"));
    }
}

#[tokio::test]
async fn unknown_intent_with_no_handler_falls_back() {
    let harness = build(Arc::new(DownNlu), vec![Arc::new(WeatherHandler)]);
    let result = harness
        .engine
        .handle_utterance(&key(), "냉장고에 뭐가 있지?")
        .await
        .unwrap();

    assert!(result.is_fallback);
    assert!(result.intent.is_unknown());
    assert_eq!(result.confidence, 0.0);
    assert!(result.handler.is_none());
    assert!(!result.suggestions.is_empty());
}

#[tokio::test]
async fn nlu_outage_still_answers_via_local_matcher() {
    let harness = build(Arc::new(DownNlu), vec![Arc::new(WeatherHandler)]);
    let result = harness
        .engine
        .handle_utterance(&key(), "오늘 날씨 어때?")
        .await
        .unwrap();

    assert!(!result.is_fallback);
    assert_eq!(result.handler.as_deref(), Some("weather"));
    assert_eq!(result.intent.name, "weather.query");
}

#[tokio::test(start_paused = true)]
async fn turn_deadline_yields_fallback_not_an_error() {
    let mut config = EngineConfig::default();
    config.turn_deadline_ms = 5_000;
    let harness = build_with_config(config, Arc::new(StuckNlu), vec![Arc::new(WeatherHandler)]);
    let mut events = harness.engine.subscribe_events();

    let result = harness
        .engine
        .handle_utterance(&key(), "오늘 날씨 어때?")
        .await
        .unwrap();
    assert!(result.is_fallback);
    assert!(result.intent.is_unknown());

    let event = events.recv().await.unwrap();
    match event {
        DialogEvent::TurnFailed { category, .. } => assert_eq!(category, "deadline_exceeded"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn history_stays_bounded_over_a_long_session() {
    let harness = build(Arc::new(TableNlu::weather()), vec![Arc::new(WeatherHandler)]);
    // Each turn appends a user and an assistant entry.
    for _ in 0..60 {
        let _ = harness
            .engine
            .handle_utterance(&key(), "오늘 날씨 어때?")
            .await
            .unwrap();
    }

    let mut stored = None;
    for _ in 0..50 {
        stored = harness.durable.load(&key()).await.unwrap();
        if stored.as_ref().is_some_and(|c| c.history.len() >= MAX_HISTORY) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let context = stored.expect("context persisted");
    assert_eq!(context.history.len(), MAX_HISTORY);
    // The newest turn survived eviction.
    assert_eq!(context.history.back().unwrap().role, TurnRole::Assistant);
}

// ── Proactive path ──────────────────────────────────────────────────

async fn seed_device_session(harness: &Harness, device: &str) {
    let mut context = ConversationContext::new(key());
    let _ = context
        .device_state
        .active_devices
        .insert(DeviceId::from(device));
    harness.durable.store(&context).await.unwrap();
}

#[tokio::test]
async fn device_event_fires_proactive_rule_once() {
    let harness = build(Arc::new(DownNlu), vec![Arc::new(GreeterHandler)]);
    seed_device_session(&harness, "speaker-1").await;
    let mut events = harness.engine.subscribe_events();

    let event = DeviceEvent::new("speaker-1", "motion.detected", json!({}));
    let fires = harness.engine.process_device_event(&event).await.unwrap();
    assert_eq!(fires.len(), 1);
    assert_eq!(fires[0].rule, "morning_greeting");
    assert_eq!(fires[0].result.speech, "좋은 아침이에요!");

    match events.recv().await.unwrap() {
        DialogEvent::ProactiveTriggered { rule, device_id, .. } => {
            assert_eq!(rule, "morning_greeting");
            assert_eq!(device_id.as_str(), "speaker-1");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Cooldown: the same event fires nothing the second time.
    let again = harness.engine.process_device_event(&event).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn proactive_turn_lands_in_session_history() {
    let harness = build(Arc::new(DownNlu), vec![Arc::new(GreeterHandler)]);
    seed_device_session(&harness, "speaker-1").await;

    let event = DeviceEvent::new("speaker-1", "motion.detected", json!({}));
    let _ = harness.engine.process_device_event(&event).await.unwrap();

    let mut stored = None;
    for _ in 0..50 {
        stored = harness.durable.load(&key()).await.unwrap();
        if stored.as_ref().is_some_and(|c| !c.history.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let context = stored.expect("context persisted");
    assert_eq!(context.history.len(), 1);
    assert_eq!(context.history[0].role, TurnRole::Proactive);
}

#[tokio::test]
async fn fire_and_forget_event_entry_point_does_not_block() {
    let harness = build(Arc::new(DownNlu), vec![Arc::new(GreeterHandler)]);
    seed_device_session(&harness, "speaker-1").await;
    let mut events = harness.engine.subscribe_events();

    harness
        .engine
        .handle_device_event(DeviceEvent::new("speaker-1", "motion.detected", json!({})));

    match events.recv().await.unwrap() {
        DialogEvent::ProactiveTriggered { rule, .. } => assert_eq!(rule, "morning_greeting"),
        other => panic!("unexpected event: {other:?}"),
    }
}
