//! Per-rule, per-user cooldown gate.
//!
//! Guarantees at most one fire per `(rule, user)` inside the rule's
//! cooldown window on a single engine instance. Delivery downstream is
//! at-least-once; duplicate proactive messages across instances are
//! tolerated by contract, missed ones are not.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use maru_core::ids::UserId;

/// Prune expired entries once the table grows past this many.
const PRUNE_THRESHOLD: usize = 1024;

/// Tracks when each `(rule, user)` pair may fire again.
#[derive(Default)]
pub struct CooldownTracker {
    deadlines: DashMap<String, Instant>,
}

impl CooldownTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to fire `rule` for `user`. Returns true and starts the
    /// cooldown window if the pair is outside its window, false otherwise.
    pub fn try_fire(&self, rule: &str, user: &UserId, cooldown: Duration) -> bool {
        if self.deadlines.len() > PRUNE_THRESHOLD {
            let now = Instant::now();
            self.deadlines.retain(|_, deadline| *deadline > now);
        }

        let now = Instant::now();
        match self.deadlines.entry(format!("{rule}:{user}")) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    return false;
                }
                let _ = occupied.insert(now + cooldown);
                true
            }
            Entry::Vacant(vacant) => {
                let _ = vacant.insert(now + cooldown);
                true
            }
        }
    }

    /// Number of tracked `(rule, user)` pairs (expired included until pruned).
    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether nothing has fired yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
