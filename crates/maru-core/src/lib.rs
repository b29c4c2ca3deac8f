//! # maru-core
//!
//! Foundation types, errors, and IDs for the Maru dialog engine.
//!
//! This crate provides the shared vocabulary that all other Maru crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::UserId`], [`ids::SessionId`], [`ids::DeviceId`]
//!   as newtypes, plus the composite [`ids::SessionKey`]
//! - **Context**: [`context::ConversationContext`] with bounded turn history,
//!   short/long-term memory, and user/environment/device state
//! - **Intents**: [`intent::Intent`] — the resolved meaning of one utterance
//! - **Responses**: [`response::PluginResponse`] from capability handlers and
//!   the aggregated [`response::DialogResult`]
//! - **Events**: [`event::DeviceEvent`] (inbound) and [`event::DialogEvent`]
//!   (outbound analytics notifications)
//! - **Errors**: [`errors::DialogError`] hierarchy via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other maru crates.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod event;
pub mod ids;
pub mod intent;
pub mod logging;
pub mod response;
