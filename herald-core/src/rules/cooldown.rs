//! Per-rule cooldown gate
//!
//! Trigger state lives apart from rule definitions so that rule reads never
//! contend with the firing hot path. The check-and-set for one rule happens
//! while holding that rule's map entry exclusively, so two concurrent
//! triggers cannot both pass the check.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

/// Mutable firing state for one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerState {
    pub last_triggered: DateTime<Utc>,
    pub trigger_count: u64,
}

#[derive(Debug, Default)]
pub struct CooldownGate {
    states: DashMap<String, TriggerState>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically decide whether `rule_id` may fire at `now`
    ///
    /// Eligible when the rule never fired or at least `cooldown` has passed
    /// since it last did. On success the new timestamp and count are written
    /// before the entry lock is released.
    ///
    /// A `now` earlier than the recorded timestamp counts as zero elapsed time.
    pub fn try_fire(&self, rule_id: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        match self.states.entry(rule_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                let elapsed = (now - state.last_triggered).to_std().unwrap_or(Duration::ZERO);
                if elapsed < cooldown {
                    return false;
                }
                state.last_triggered = now;
                state.trigger_count += 1;
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(TriggerState {
                    last_triggered: now,
                    trigger_count: 1,
                });
                true
            }
        }
    }

    pub fn state(&self, rule_id: &str) -> Option<TriggerState> {
        self.states.get(rule_id).map(|s| *s)
    }

    /// Drop trigger state (rule removed)
    pub fn forget(&self, rule_id: &str) {
        self.states.remove(rule_id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
