//! # maru-runtime
//!
//! The top of the stack: wires context storage, intent resolution,
//! plugin dispatch, and the proactive engine into one [`DialogEngine`],
//! publishes analytics events, and owns runtime configuration.
//!
//! ## Crate Position
//!
//! Depends on: every other maru crate. Depended on by: binaries and
//! embedding applications.

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod publisher;

pub use config::EngineConfig;
pub use engine::DialogEngine;
pub use publisher::EventPublisher;
