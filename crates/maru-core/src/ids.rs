//! Branded ID newtypes for type safety.
//!
//! Every entity in the Maru system has a distinct ID type implemented as a
//! newtype wrapper around `String`. This prevents accidentally passing a
//! device ID where a session ID is expected.
//!
//! Generated IDs ([`TurnId`]) are UUID v7 (time-ordered) via
//! [`uuid::Uuid::now_v7`]; user, session, and device IDs arrive from the
//! ingress collaborator and are wrapped as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a user.
    UserId
}

branded_id! {
    /// Unique identifier for a dialog session.
    SessionId
}

branded_id! {
    /// Unique identifier for an edge device.
    DeviceId
}

branded_id! {
    /// Unique identifier for a single dialog turn.
    TurnId
}

/// Composite key addressing a conversation context.
///
/// A context is always addressed by its `(user, session)` pair, never by
/// either ID alone. The [`cache_key`](SessionKey::cache_key) form is the
/// string key used by the fast cache tier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    /// Owning user.
    pub user_id: UserId,
    /// Session within that user's dialog history.
    pub session_id: SessionId,
}

impl SessionKey {
    /// Create a key from user and session IDs.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, session_id: impl Into<SessionId>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// String form used by the fast cache tier.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("context:{}:{}", self.user_id, self.session_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.session_id)
    }
}
