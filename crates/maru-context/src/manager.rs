//! Central context manager.
//!
//! [`ContextManager`] owns all reads and writes of conversational state:
//! get-or-create with enrichment, serialized per-session updates, and
//! device lookup for the proactive path. No other component mutates a
//! [`ConversationContext`].
//!
//! INVARIANT: updates for one `(user, session)` are serialized via a
//! per-key async lock. The durable write is scheduled in the background
//! while the lock is still held, so durable-tier writes for one session
//! are totally ordered even though callers never wait for them.
//!
//! INVARIANT: every fast-tier value write for a session happens under
//! that session's lock. Reads refresh the sliding TTL in place; a read
//! that needs to repopulate the cache does so under the lock and defers
//! to any entry a concurrent update wrote first.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use maru_core::context::{ContextDelta, ConversationContext, UserStatePatch};
use maru_core::errors::DialogError;
use maru_core::ids::{DeviceId, SessionKey};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument, warn};

use crate::enrichment::Enricher;
use crate::errors::Result as StoreResult;
use crate::tiers::{CacheTier, DurableTier};

/// Prune the lock table once it grows past this many entries.
const LOCK_TABLE_PRUNE_THRESHOLD: usize = 128;

/// Context manager configuration.
#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Sliding fast-tier TTL. Contexts idle longer than this are evicted
    /// from the cache; the durable tier remains the long-lived record.
    pub cache_ttl: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Which tier satisfied a read.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ReadSource {
    Cache,
    Durable,
}

/// Outcome of reading both tiers.
struct TierRead {
    found: Option<(ConversationContext, ReadSource)>,
    cache_down: bool,
    durable_down: bool,
}

impl TierRead {
    fn tiers_down(&self) -> u8 {
        u8::from(self.cache_down) + u8::from(self.durable_down)
    }
}

/// Owns get-or-create, update, and device-lookup semantics for
/// conversational state across both storage tiers.
pub struct ContextManager {
    cache: Arc<dyn CacheTier>,
    durable: Arc<dyn DurableTier>,
    enricher: Enricher,
    config: ContextConfig,
    /// Per-session write locks, created lazily and pruned when idle.
    session_locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
    /// Sessions rebuilt from scratch while the durable tier was down.
    /// Their next successful durable write merges with the stored record
    /// instead of overwriting it.
    rebuilt_sessions: Arc<Mutex<HashSet<SessionKey>>>,
}

impl ContextManager {
    /// Create a manager over the given tiers.
    pub fn new(
        cache: Arc<dyn CacheTier>,
        durable: Arc<dyn DurableTier>,
        enricher: Enricher,
        config: ContextConfig,
    ) -> Self {
        Self {
            cache,
            durable,
            enricher,
            config,
            session_locks: Mutex::new(HashMap::new()),
            rebuilt_sessions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Fetch the context for a session, creating it on first use.
    ///
    /// Reads the fast tier first, then the durable tier; a double miss
    /// constructs a fresh context. Every successful call refreshes the
    /// sliding fast-tier TTL and runs the enrichment step (failures there
    /// are logged, never fatal). Only a double tier *failure* errors.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get_or_create(&self, key: &SessionKey) -> Result<ConversationContext, DialogError> {
        let read = self.read_tiers(key).await;
        let mut context = match read.found {
            Some((mut context, ReadSource::Cache)) => {
                self.slide_ttl(key, &mut context).await;
                context
            }
            Some((mut context, ReadSource::Durable)) => {
                self.write_back(&mut context).await;
                context
            }
            None if read.tiers_down() < 2 => {
                debug!(key = %key, "creating new context");
                if read.durable_down {
                    self.mark_rebuilt(key);
                }
                let mut context = ConversationContext::new(key.clone());
                self.write_back(&mut context).await;
                context
            }
            None => {
                return Err(DialogError::ContextUnavailable(
                    "both storage tiers unreachable".to_string(),
                ));
            }
        };

        let failed = self.enricher.enrich(&mut context).await;
        if !failed.is_empty() {
            // Non-fatal: the context is served without the missing data.
            let partial = DialogError::EnrichmentPartial(failed.join(", "));
            warn!(key = %key, error = %partial, "context served partially enriched");
        }

        Ok(context)
    }

    /// Apply a delta to a session's context.
    ///
    /// Serialized per session key: concurrent updates for the same
    /// `(user, session)` are applied in some total order and no delta is
    /// lost. The fast tier is written before returning (reads later in
    /// the same request chain observe the update); the durable write is
    /// scheduled in the background under the same lock.
    #[instrument(skip(self, delta), fields(key = %key))]
    pub async fn update(
        &self,
        key: &SessionKey,
        delta: ContextDelta,
    ) -> Result<ConversationContext, DialogError> {
        let lock = self.acquire_session_lock(key);
        let guard = lock.lock_owned().await;

        let read = self.read_tiers(key).await;
        let mut context = match read.found {
            Some((context, _)) => context,
            None if read.tiers_down() < 2 => {
                if read.durable_down {
                    self.mark_rebuilt(key);
                }
                ConversationContext::new(key.clone())
            }
            None => {
                return Err(DialogError::ContextUnavailable(
                    "both storage tiers unreachable".to_string(),
                ));
            }
        };

        context.apply(&delta);
        context.touch(Utc::now());

        let reconcile = self.is_rebuilt(key);
        let cache_ok = self.write_cache(&mut context).await;
        if cache_ok {
            // Caller returns now; the guard rides along with the durable
            // write so the next update for this session waits for it.
            let durable = Arc::clone(&self.durable);
            let cache = Arc::clone(&self.cache);
            let rebuilt = Arc::clone(&self.rebuilt_sessions);
            let ttl = self.config.cache_ttl;
            let snapshot = context.clone();
            drop(tokio::spawn(async move {
                let _guard = guard;
                if let Err(e) =
                    persist(&*durable, &*cache, &rebuilt, ttl, &snapshot, reconcile).await
                {
                    warn!(key = %snapshot.key(), error = %e, "background durable write failed");
                    counter!("context_tier_degraded", "tier" => "durable").increment(1);
                }
            }));
        } else {
            // Fast tier down: fall back to a synchronous durable write so
            // the update is observable at all.
            persist(
                &*self.durable,
                &*self.cache,
                &self.rebuilt_sessions,
                self.config.cache_ttl,
                &context,
                reconcile,
            )
            .await
            .map_err(|e| {
                DialogError::ContextUnavailable(format!("both tiers failed on write: {e}"))
            })?;
        }

        Ok(context)
    }

    /// Find the most recently active context involving a device (used by
    /// the proactive path). Repopulates the fast tier on a hit.
    #[instrument(skip(self), fields(device = %device))]
    pub async fn get_by_device(
        &self,
        device: &DeviceId,
    ) -> Result<Option<ConversationContext>, DialogError> {
        let found = self
            .durable
            .find_by_device(device)
            .await
            .map_err(|e| DialogError::ContextUnavailable(format!("device lookup failed: {e}")))?;

        match found {
            Some(mut context) => {
                self.write_back(&mut context).await;
                Ok(Some(context))
            }
            None => Ok(None),
        }
    }

    /// Read the fast tier, then the durable tier.
    async fn read_tiers(&self, key: &SessionKey) -> TierRead {
        let mut cache_down = false;

        match self.cache.get(key).await {
            Ok(Some(context)) => {
                counter!("context_cache", "result" => "hit").increment(1);
                return TierRead {
                    found: Some((context, ReadSource::Cache)),
                    cache_down: false,
                    durable_down: false,
                };
            }
            Ok(None) => counter!("context_cache", "result" => "miss").increment(1),
            Err(e) => {
                warn!(key = %key, error = %e, "fast tier read failed, degrading to durable");
                counter!("context_tier_degraded", "tier" => "cache").increment(1);
                cache_down = true;
            }
        }

        match self.durable.load(key).await {
            Ok(found) => TierRead {
                found: found.map(|context| (context, ReadSource::Durable)),
                cache_down,
                durable_down: false,
            },
            Err(e) => {
                warn!(key = %key, error = %e, "durable tier read failed, degrading to cache only");
                counter!("context_tier_degraded", "tier" => "durable").increment(1);
                TierRead {
                    found: None,
                    cache_down,
                    durable_down: true,
                }
            }
        }
    }

    /// Refresh the sliding TTL of a cache-resident context in place. No
    /// value is written, so a concurrent update's entry can never be
    /// replaced by this read's older snapshot.
    async fn slide_ttl(&self, key: &SessionKey, context: &mut ConversationContext) {
        let ttl = self.config.cache_ttl;
        match self.cache.touch(key, ttl).await {
            Ok(true) => {
                context.expires_at = chrono::Duration::from_std(ttl).ok().map(|d| Utc::now() + d);
            }
            Ok(false) => {
                // Entry expired between the read and the touch.
                self.write_back(context).await;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "fast tier touch failed");
                counter!("context_tier_degraded", "tier" => "cache").increment(1);
            }
        }
    }

    /// Populate the fast tier with a context read from the durable tier
    /// (or created fresh). Runs under the session lock; if a concurrent
    /// update wrote an entry in the meantime, that entry wins and the
    /// caller's context is replaced with it.
    async fn write_back(&self, context: &mut ConversationContext) {
        let key = context.key();
        let lock = self.acquire_session_lock(&key);
        let _guard = lock.lock().await;
        match self.cache.get(&key).await {
            Ok(Some(newer)) => *context = newer,
            _ => {
                let _ = self.write_cache(context).await;
            }
        }
    }

    /// Write the context to the fast tier with a fresh sliding TTL.
    /// Returns false (with a logged warning) if the tier is down.
    async fn write_cache(&self, context: &mut ConversationContext) -> bool {
        let ttl = self.config.cache_ttl;
        context.expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .map(|d| Utc::now() + d);
        match self.cache.put(context, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %context.key(), error = %e, "fast tier write failed");
                counter!("context_tier_degraded", "tier" => "cache").increment(1);
                false
            }
        }
    }

    fn mark_rebuilt(&self, key: &SessionKey) {
        let _ = self.rebuilt_sessions.lock().insert(key.clone());
    }

    fn is_rebuilt(&self, key: &SessionKey) -> bool {
        self.rebuilt_sessions.lock().contains(key)
    }

    fn acquire_session_lock(&self, key: &SessionKey) -> Arc<AsyncMutex<()>> {
        let cache_key = key.cache_key();
        let mut locks = self.session_locks.lock();

        // Opportunistically prune dead weak refs when the map grows.
        if locks.len() > LOCK_TABLE_PRUNE_THRESHOLD {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(&cache_key).and_then(Weak::upgrade) {
            return existing;
        }

        let lock = Arc::new(AsyncMutex::new(()));
        let _ = locks.insert(cache_key, Arc::downgrade(&lock));
        lock
    }
}

/// Write a session snapshot to the durable tier.
///
/// A session rebuilt during a durable outage is merged onto the stored
/// record rather than upserted over it, so long-term memory and earlier
/// history survive the outage. On a successful merge the merged record
/// also replaces the rebuilt cache copy (the caller holds the session
/// lock, so this cannot race another writer) and the session leaves the
/// rebuilt set.
async fn persist(
    durable: &dyn DurableTier,
    cache: &dyn CacheTier,
    rebuilt: &Mutex<HashSet<SessionKey>>,
    ttl: Duration,
    snapshot: &ConversationContext,
    reconcile: bool,
) -> StoreResult<()> {
    if !reconcile {
        return durable.store(snapshot).await;
    }

    let key = snapshot.key();
    let mut merged = match durable.load(&key).await? {
        Some(stored) => merge_rebuilt(stored, snapshot),
        None => snapshot.clone(),
    };
    durable.store(&merged).await?;

    merged.expires_at = chrono::Duration::from_std(ttl).ok().map(|d| Utc::now() + d);
    let _ = cache.put(&merged, ttl).await;
    let _ = rebuilt.lock().remove(&key);
    Ok(())
}

/// Merge a context rebuilt during a durable outage onto the stored
/// record: stored history first with the rebuilt turns appended, memory
/// maps merged with the rebuilt entries winning per key, user and device
/// state overlaid. Nothing the stored record accumulated is dropped.
fn merge_rebuilt(
    mut stored: ConversationContext,
    rebuilt: &ConversationContext,
) -> ConversationContext {
    for turn in &rebuilt.history {
        if !stored.history.iter().any(|t| t.id == turn.id) {
            stored.push_turn(turn.clone());
        }
    }
    stored.merge_short_term(&rebuilt.short_term_memory);
    stored.merge_long_term(&rebuilt.long_term_memory);
    stored.user_state.apply(&UserStatePatch {
        activity: rebuilt.user_state.activity.clone(),
        mood: rebuilt.user_state.mood.clone(),
        location: rebuilt.user_state.location.clone(),
        language: rebuilt.user_state.language.clone(),
        recent_topics: rebuilt.user_state.recent_topics.clone(),
    });
    for device in &rebuilt.device_state.active_devices {
        let _ = stored
            .device_state
            .active_devices
            .insert(device.clone());
    }
    for (name, value) in &rebuilt.device_state.attributes {
        let _ = stored
            .device_state
            .attributes
            .insert(name.clone(), value.clone());
    }
    if rebuilt.environment_state.temperature.is_some() {
        stored.environment_state.temperature = rebuilt.environment_state.temperature;
    }
    if rebuilt.environment_state.humidity.is_some() {
        stored.environment_state.humidity = rebuilt.environment_state.humidity;
    }
    if rebuilt.environment_state.light_level.is_some() {
        stored.environment_state.light_level = rebuilt.environment_state.light_level;
    }
    if rebuilt.environment_state.noise_level.is_some() {
        stored.environment_state.noise_level = rebuilt.environment_state.noise_level;
    }
    if rebuilt.environment_state.last_motion_at.is_some() {
        stored.environment_state.last_motion_at = rebuilt.environment_state.last_motion_at;
    }
    stored.touch(rebuilt.last_interaction_at);
    stored
}
