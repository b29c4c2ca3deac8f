//! Conversational context — the per-session state record.
//!
//! [`ConversationContext`] is the durable-plus-cached state for one
//! `(user, session)` pair: a bounded turn history, short/long-term memory
//! maps, and user/environment/device state. Only the Context Manager
//! (in `maru-context`) mutates it; everything else reads.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{DeviceId, SessionId, SessionKey, TurnId, UserId};

/// Maximum number of turns retained in history. Oldest turns are evicted
/// first (append-only ring semantics).
pub const MAX_HISTORY: usize = 100;

/// Maximum number of recent topics tracked in [`UserState`].
pub const MAX_RECENT_TOPICS: usize = 10;

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// A user utterance.
    User,
    /// A system response to a user utterance.
    Assistant,
    /// A system-initiated proactive message.
    Proactive,
}

/// One entry in the conversation history.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogTurn {
    /// Unique turn ID (UUID v7).
    pub id: TurnId,
    /// Who produced this turn.
    pub role: TurnRole,
    /// Spoken/written text of the turn.
    pub text: String,
    /// Resolved intent name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Confidence of the resolution or response, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// When the turn happened.
    pub timestamp: DateTime<Utc>,
}

impl DialogTurn {
    /// A user utterance turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role: TurnRole::User,
            text: text.into(),
            intent: None,
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    /// A system response turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>, intent: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: TurnId::new(),
            role: TurnRole::Assistant,
            text: text.into(),
            intent: Some(intent.into()),
            confidence: Some(confidence),
            timestamp: Utc::now(),
        }
    }

    /// A proactive (system-initiated) turn.
    #[must_use]
    pub fn proactive(text: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role: TurnRole::Proactive,
            text: text.into(),
            intent: Some(intent.into()),
            confidence: None,
            timestamp: Utc::now(),
        }
    }
}

/// What the user is currently doing, feeling, and talking about.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    /// Current activity (e.g. "cooking"), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    /// Inferred mood, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    /// Last known location (room name), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Most recent conversation topics, newest last.
    #[serde(default)]
    pub recent_topics: Vec<String>,
    /// Preferred language code (BCP 47), forwarded to the NLU service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl UserState {
    /// Apply a patch: set fields present in the patch, append new topics.
    pub fn apply(&mut self, patch: &UserStatePatch) {
        if let Some(activity) = &patch.activity {
            self.activity = Some(activity.clone());
        }
        if let Some(mood) = &patch.mood {
            self.mood = Some(mood.clone());
        }
        if let Some(location) = &patch.location {
            self.location = Some(location.clone());
        }
        if let Some(language) = &patch.language {
            self.language = Some(language.clone());
        }
        for topic in &patch.recent_topics {
            self.push_topic(topic.clone());
        }
    }

    /// Record a topic, keeping at most [`MAX_RECENT_TOPICS`] (newest last).
    pub fn push_topic(&mut self, topic: String) {
        self.recent_topics.retain(|t| t != &topic);
        self.recent_topics.push(topic);
        if self.recent_topics.len() > MAX_RECENT_TOPICS {
            let overflow = self.recent_topics.len() - MAX_RECENT_TOPICS;
            self.recent_topics.drain(..overflow);
        }
    }
}

/// Partial update to [`UserState`]. `None` fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatePatch {
    /// New activity, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    /// New mood, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    /// New location, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Topics to append.
    #[serde(default)]
    pub recent_topics: Vec<String>,
    /// New language preference, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Sensor-derived state of the user's environment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentState {
    /// Temperature in °C.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Relative humidity in %.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// Ambient light level (lux).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light_level: Option<f64>,
    /// Ambient noise level (dB).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_level: Option<f64>,
    /// When motion was last detected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_motion_at: Option<DateTime<Utc>>,
}

/// Devices active in this session and their free-form attributes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    /// Devices currently bound to the session.
    #[serde(default)]
    pub active_devices: HashSet<DeviceId>,
    /// Free-form per-device attributes (volume, firmware, …).
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// The full conversational state for one `(user, session)` pair.
///
/// Invariants:
/// - `history.len() <= MAX_HISTORY`; oldest turns evicted first
/// - `last_interaction_at` is monotonically non-decreasing
/// - mutated only by the Context Manager
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    /// Owning user.
    pub user_id: UserId,
    /// Session within that user's dialog history.
    pub session_id: SessionId,
    /// Bounded turn history, oldest first.
    #[serde(default)]
    pub history: VecDeque<DialogTurn>,
    /// Working memory for the current conversation. Most-recent write wins.
    #[serde(default)]
    pub short_term_memory: HashMap<String, Value>,
    /// Accumulative memory across conversations. Never silently truncated.
    #[serde(default)]
    pub long_term_memory: HashMap<String, Value>,
    /// User activity/mood/location/topics.
    #[serde(default)]
    pub user_state: UserState,
    /// Sensor-derived environment state.
    #[serde(default)]
    pub environment_state: EnvironmentState,
    /// Active devices and their attributes.
    #[serde(default)]
    pub device_state: DeviceState,
    /// When this context was first created.
    pub created_at: DateTime<Utc>,
    /// Last user or proactive interaction. Monotonically non-decreasing.
    pub last_interaction_at: DateTime<Utc>,
    /// When the fast-tier entry expires (sliding).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConversationContext {
    /// Create a fresh context with empty collections, stamped now.
    #[must_use]
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            user_id: key.user_id,
            session_id: key.session_id,
            history: VecDeque::new(),
            short_term_memory: HashMap::new(),
            long_term_memory: HashMap::new(),
            user_state: UserState::default(),
            environment_state: EnvironmentState::default(),
            device_state: DeviceState::default(),
            created_at: now,
            last_interaction_at: now,
            expires_at: None,
        }
    }

    /// The composite key addressing this context.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
        }
    }

    /// Append a turn, evicting the oldest if the history is full.
    pub fn push_turn(&mut self, turn: DialogTurn) {
        if self.history.len() >= MAX_HISTORY {
            let _ = self.history.pop_front();
        }
        self.history.push_back(turn);
    }

    /// Advance `last_interaction_at`. Never moves backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_interaction_at {
            self.last_interaction_at = now;
        }
    }

    /// Merge entries into short-term memory. Most-recent write wins.
    pub fn merge_short_term(&mut self, entries: &HashMap<String, Value>) {
        for (k, v) in entries {
            let _ = self.short_term_memory.insert(k.clone(), v.clone());
        }
    }

    /// Merge entries into long-term memory. Accumulative.
    pub fn merge_long_term(&mut self, entries: &HashMap<String, Value>) {
        for (k, v) in entries {
            let _ = self.long_term_memory.insert(k.clone(), v.clone());
        }
    }

    /// Apply a full delta: turns, memory merges, user-state patch.
    pub fn apply(&mut self, delta: &ContextDelta) {
        for turn in &delta.turns {
            self.push_turn(turn.clone());
        }
        self.merge_short_term(&delta.short_term);
        self.merge_long_term(&delta.long_term);
        if let Some(patch) = &delta.user_state {
            self.user_state.apply(patch);
        }
    }
}

/// One update applied atomically to a context by the Context Manager.
#[derive(Clone, Debug, Default)]
pub struct ContextDelta {
    /// Turns to append (oldest first).
    pub turns: Vec<DialogTurn>,
    /// Short-term memory entries to merge.
    pub short_term: HashMap<String, Value>,
    /// Long-term memory entries to merge.
    pub long_term: HashMap<String, Value>,
    /// User-state patch to apply.
    pub user_state: Option<UserStatePatch>,
}

impl ContextDelta {
    /// Delta containing a single turn.
    #[must_use]
    pub fn with_turn(turn: DialogTurn) -> Self {
        Self {
            turns: vec![turn],
            ..Self::default()
        }
    }

    /// Add a turn to this delta.
    #[must_use]
    pub fn and_turn(mut self, turn: DialogTurn) -> Self {
        self.turns.push(turn);
        self
    }

    /// Add a short-term memory entry.
    #[must_use]
    pub fn and_short_term(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.short_term.insert(key.into(), value);
        self
    }

    /// Add a long-term memory entry.
    #[must_use]
    pub fn and_long_term(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.long_term.insert(key.into(), value);
        self
    }

    /// Set the user-state patch.
    #[must_use]
    pub fn and_user_state(mut self, patch: UserStatePatch) -> Self {
        self.user_state = Some(patch);
        self
    }
}
