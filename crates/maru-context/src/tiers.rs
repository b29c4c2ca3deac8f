//! Storage tier traits.
//!
//! Two tiers back every context: a fast, TTL-bounded cache and a durable
//! document store. Both are keyed by the composite [`SessionKey`]; the
//! durable tier additionally supports lookup by active device (used by
//! the proactive path).

use std::time::Duration;

use async_trait::async_trait;
use maru_core::context::ConversationContext;
use maru_core::ids::{DeviceId, SessionKey};

use crate::errors::Result;

/// Fast, TTL-aware key/value tier.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Fetch the cached context, if present and unexpired.
    async fn get(&self, key: &SessionKey) -> Result<Option<ConversationContext>>;

    /// Store the context with a fresh (sliding) TTL.
    async fn put(&self, context: &ConversationContext, ttl: Duration) -> Result<()>;

    /// Slide the TTL of an existing entry without replacing its value.
    /// Returns false when no live entry exists. Readers use this so a
    /// TTL refresh can never overwrite a concurrent writer's entry.
    async fn touch(&self, key: &SessionKey, ttl: Duration) -> Result<bool>;

    /// Evict the context.
    async fn remove(&self, key: &SessionKey) -> Result<()>;
}

/// Durable document tier — the long-lived record.
#[async_trait]
pub trait DurableTier: Send + Sync {
    /// Load the stored context, if any.
    async fn load(&self, key: &SessionKey) -> Result<Option<ConversationContext>>;

    /// Store (upsert) the context document.
    async fn store(&self, context: &ConversationContext) -> Result<()>;

    /// Find the most recently active context that has `device` among its
    /// active devices.
    async fn find_by_device(&self, device: &DeviceId) -> Result<Option<ConversationContext>>;
}
