//! # maru-context
//!
//! Tiered context storage and the Context Manager.
//!
//! - **Tiers**: [`CacheTier`] (fast, TTL-bounded) and [`DurableTier`]
//!   (document store, long-lived record)
//! - **Backends**: [`MemoryCache`] / [`MemoryDurable`] for in-process use
//!   and tests, [`SqliteDurable`] for persistent single-node deployments
//! - **Enrichment**: optional profile/environment/pattern collaborators,
//!   each independently degradable
//! - **Manager**: [`ContextManager`] — get-or-create, serialized updates,
//!   device lookup, tier-degradation semantics
//!
//! ## Crate Position
//!
//! Depends on: maru-core. Depended on by: maru-proactive, maru-runtime.

#![deny(unsafe_code)]

pub mod enrichment;
pub mod errors;
pub mod manager;
pub mod memory;
pub mod sqlite;
pub mod tiers;

pub use enrichment::{EnrichmentError, Enricher, EnvironmentService, PatternService, ProfileService, UserProfile};
pub use errors::StoreError;
pub use manager::{ContextConfig, ContextManager};
pub use memory::{MemoryCache, MemoryDurable};
pub use sqlite::SqliteDurable;
pub use tiers::{CacheTier, DurableTier};
