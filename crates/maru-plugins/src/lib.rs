//! # maru-plugins
//!
//! Capability handlers ("plugins") for the Maru dialog engine.
//!
//! - **Handler**: [`PluginHandler`] — the trait every capability implements
//! - **Rules**: [`ProactiveRule`] — trigger predicates handlers register
//!   for event-driven proactive turns
//! - **Registry**: [`PluginRegistry`] — deterministic candidate selection
//! - **Dispatcher**: [`PluginDispatcher`] — concurrent fan-out with
//!   per-handler timeouts and single-primary aggregation
//!
//! ## Crate Position
//!
//! Depends on: maru-core. Depended on by: maru-proactive, maru-runtime.

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod handler;
pub mod registry;
pub mod rules;

pub use dispatcher::{Dispatched, DispatcherConfig, PluginDispatcher};
pub use handler::{PluginError, PluginHandler};
pub use registry::PluginRegistry;
pub use rules::{ProactiveRule, RulePriority};
