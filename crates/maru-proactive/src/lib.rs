//! # maru-proactive
//!
//! Event-driven proactive dialog: device events are matched against the
//! rules handlers registered, surviving rules pass a per-user cooldown
//! gate, and each fired rule produces a system-initiated turn without
//! going through the intent resolver.
//!
//! ## Crate Position
//!
//! Depends on: maru-core, maru-context, maru-plugins. Depended on by:
//! maru-runtime.

#![deny(unsafe_code)]

pub mod cooldown;
pub mod engine;
pub mod template;

pub use cooldown::CooldownTracker;
pub use engine::{ProactiveEngine, ProactiveFire};
