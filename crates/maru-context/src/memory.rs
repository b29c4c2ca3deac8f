//! In-process tier backends.
//!
//! [`MemoryCache`] is the default fast tier for single-node deployments
//! and tests; [`MemoryDurable`] stands in for the document store in tests.
//! Both are safe for concurrent use.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use maru_core::context::ConversationContext;
use maru_core::ids::{DeviceId, SessionKey};

use crate::errors::Result;
use crate::tiers::{CacheTier, DurableTier};

/// Sweep the expiry map once it grows past this many entries.
const SWEEP_THRESHOLD: usize = 1024;

struct CacheEntry {
    context: ConversationContext,
    deadline: Instant,
}

/// In-process TTL cache over a concurrent map.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired, not yet swept) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep_if_large(&self) {
        if self.entries.len() > SWEEP_THRESHOLD {
            let now = Instant::now();
            self.entries.retain(|_, entry| entry.deadline > now);
        }
    }
}

#[async_trait]
impl CacheTier for MemoryCache {
    async fn get(&self, key: &SessionKey) -> Result<Option<ConversationContext>> {
        let cache_key = key.cache_key();
        if let Some(entry) = self.entries.get(&cache_key) {
            if entry.deadline > Instant::now() {
                return Ok(Some(entry.context.clone()));
            }
        }
        // Expired entries are dropped on access.
        let _ = self.entries.remove(&cache_key);
        Ok(None)
    }

    async fn put(&self, context: &ConversationContext, ttl: Duration) -> Result<()> {
        self.sweep_if_large();
        let _ = self.entries.insert(
            context.key().cache_key(),
            CacheEntry {
                context: context.clone(),
                deadline: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn touch(&self, key: &SessionKey, ttl: Duration) -> Result<bool> {
        let cache_key = key.cache_key();
        if let Some(mut entry) = self.entries.get_mut(&cache_key) {
            if entry.deadline > Instant::now() {
                entry.deadline = Instant::now() + ttl;
                return Ok(true);
            }
        }
        // Expired entries are dropped on access.
        let _ = self.entries.remove(&cache_key);
        Ok(false)
    }

    async fn remove(&self, key: &SessionKey) -> Result<()> {
        let _ = self.entries.remove(&key.cache_key());
        Ok(())
    }
}

/// In-process durable tier for tests and cacheless single-node runs.
#[derive(Default)]
pub struct MemoryDurable {
    documents: DashMap<SessionKey, ConversationContext>,
}

impl MemoryDurable {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DurableTier for MemoryDurable {
    async fn load(&self, key: &SessionKey) -> Result<Option<ConversationContext>> {
        Ok(self.documents.get(key).map(|doc| doc.clone()))
    }

    async fn store(&self, context: &ConversationContext) -> Result<()> {
        let _ = self.documents.insert(context.key(), context.clone());
        Ok(())
    }

    async fn find_by_device(&self, device: &DeviceId) -> Result<Option<ConversationContext>> {
        // Linear scan is fine for the in-process backend; the sqlite tier
        // keeps a real device index.
        let mut best: Option<ConversationContext> = None;
        for doc in &self.documents {
            if doc.device_state.active_devices.contains(device) {
                let newer = best
                    .as_ref()
                    .is_none_or(|b| doc.last_interaction_at > b.last_interaction_at);
                if newer {
                    best = Some(doc.clone());
                }
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Duration as ChronoDuration;

    use super::*;

    fn ctx(user: &str, session: &str) -> ConversationContext {
        ConversationContext::new(SessionKey::new(user, session))
    }

    fn ctx_with_device(user: &str, session: &str, device: &str) -> ConversationContext {
        let mut c = ctx(user, session);
        c.device_state.active_devices =
            HashSet::from([DeviceId::from(device)]);
        c
    }

    #[tokio::test]
    async fn cache_put_then_get() {
        let cache = MemoryCache::new();
        let c = ctx("u1", "s1");
        cache.put(&c, Duration::from_secs(60)).await.unwrap();

        let got = cache.get(&c.key()).await.unwrap().unwrap();
        assert_eq!(got.user_id, c.user_id);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn cache_get_after_expiry_is_miss() {
        let cache = MemoryCache::new();
        let c = ctx("u1", "s1");
        cache.put(&c, Duration::from_millis(10)).await.unwrap();

        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get(&c.key()).await.unwrap().is_none());
        // Expired entry was dropped on access.
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn cache_put_slides_ttl() {
        let cache = MemoryCache::new();
        let c = ctx("u1", "s1");
        cache.put(&c, Duration::from_millis(30)).await.unwrap();
        std::thread::sleep(Duration::from_millis(20));

        // Re-put before expiry extends the deadline.
        cache.put(&c, Duration::from_millis(30)).await.unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(&c.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cache_touch_slides_ttl_without_rewriting() {
        let cache = MemoryCache::new();
        let mut c = ctx("u1", "s1");
        c.push_turn(maru_core::context::DialogTurn::user("kept"));
        cache.put(&c, Duration::from_millis(30)).await.unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.touch(&c.key(), Duration::from_millis(60)).await.unwrap());
        std::thread::sleep(Duration::from_millis(20));

        // Still present past the original deadline, value untouched.
        let got = cache.get(&c.key()).await.unwrap().unwrap();
        assert_eq!(got.history.len(), 1);
    }

    #[tokio::test]
    async fn cache_touch_missing_or_expired_is_false() {
        let cache = MemoryCache::new();
        let c = ctx("u1", "s1");
        assert!(!cache.touch(&c.key(), Duration::from_secs(60)).await.unwrap());

        cache.put(&c, Duration::from_millis(10)).await.unwrap();
        std::thread::sleep(Duration::from_millis(25));
        assert!(!cache.touch(&c.key(), Duration::from_secs(60)).await.unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn cache_remove_evicts() {
        let cache = MemoryCache::new();
        let c = ctx("u1", "s1");
        cache.put(&c, Duration::from_secs(60)).await.unwrap();
        cache.remove(&c.key()).await.unwrap();
        assert!(cache.get(&c.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn durable_store_and_load() {
        let store = MemoryDurable::new();
        let c = ctx("u1", "s1");
        store.store(&c).await.unwrap();

        let got = store.load(&c.key()).await.unwrap().unwrap();
        assert_eq!(got.session_id, c.session_id);
        assert!(store.load(&SessionKey::new("u1", "other")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn durable_store_upserts() {
        let store = MemoryDurable::new();
        let mut c = ctx("u1", "s1");
        store.store(&c).await.unwrap();

        c.push_turn(maru_core::context::DialogTurn::user("hi"));
        store.store(&c).await.unwrap();

        assert_eq!(store.len(), 1);
        let got = store.load(&c.key()).await.unwrap().unwrap();
        assert_eq!(got.history.len(), 1);
    }

    #[tokio::test]
    async fn find_by_device_prefers_most_recent() {
        let store = MemoryDurable::new();
        let mut older = ctx_with_device("u1", "s1", "speaker-1");
        let mut newer = ctx_with_device("u1", "s2", "speaker-1");
        let base = older.last_interaction_at;
        older.touch(base + ChronoDuration::seconds(1));
        newer.touch(base + ChronoDuration::seconds(5));
        store.store(&older).await.unwrap();
        store.store(&newer).await.unwrap();

        let found = store
            .find_by_device(&DeviceId::from("speaker-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.session_id.as_str(), "s2");
    }

    #[tokio::test]
    async fn find_by_device_unknown_is_none() {
        let store = MemoryDurable::new();
        store.store(&ctx("u1", "s1")).await.unwrap();
        assert!(
            store
                .find_by_device(&DeviceId::from("nope"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
