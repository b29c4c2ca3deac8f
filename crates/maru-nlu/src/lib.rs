//! # maru-nlu
//!
//! Intent resolution for the Maru dialog engine.
//!
//! - **Client**: [`NluClient`] trait + [`HttpNluClient`] wrapping the
//!   external NLU collaborator with a bounded timeout
//! - **Matcher**: [`LocalMatcher`] — regex fallback over a small fixed
//!   pattern table, used when the collaborator is unreachable
//! - **Resolver**: [`IntentResolver`] — never errors past this boundary;
//!   the pipeline can always run with a zero-confidence intent
//!
//! ## Crate Position
//!
//! Depends on: maru-core. Depended on by: maru-runtime.

#![deny(unsafe_code)]

pub mod client;
pub mod matcher;
pub mod resolver;

pub use client::{HttpNluClient, NluAnalysis, NluClient, NluError, NluRequest};
pub use matcher::LocalMatcher;
pub use resolver::IntentResolver;
