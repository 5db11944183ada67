//! Concurrent rule registry with an event-type subscription index
//!
//! The rule map and the subscription index share one lock so that a reader
//! never sees a rule without its index entry (or the reverse). The index is
//! maintained incrementally on every mutation.

use super::cooldown::{CooldownGate, TriggerState};
use super::rule::AlertRule;
use crate::core::{AlertError, EntityKind, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    rules: HashMap<String, Arc<AlertRule>>,
    /// event type → rule ids, in insertion order
    subscriptions: HashMap<String, Vec<String>>,
}

impl Inner {
    fn subscribe(&mut self, event_type: &str, rule_id: &str) {
        self.subscriptions
            .entry(event_type.to_string())
            .or_default()
            .push(rule_id.to_string());
    }

    fn unsubscribe(&mut self, event_type: &str, rule_id: &str) {
        if let Some(ids) = self.subscriptions.get_mut(event_type) {
            ids.retain(|id| id != rule_id);
            if ids.is_empty() {
                self.subscriptions.remove(event_type);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RuleStore {
    inner: RwLock<Inner>,
    gate: CooldownGate,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a rule, assigning a UUID when `id` is empty
    pub fn add(&self, mut rule: AlertRule) -> Result<AlertRule> {
        rule.validate()?;
        if rule.id.trim().is_empty() {
            rule.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        rule.created_at = now;
        rule.updated_at = now;
        rule.last_triggered = None;
        rule.trigger_count = 0;

        let mut inner = self.inner.write();
        if inner.rules.contains_key(&rule.id) {
            return Err(AlertError::AlreadyExists {
                kind: EntityKind::Rule,
                id: rule.id,
            });
        }
        inner.subscribe(&rule.event_type, &rule.id);
        inner.rules.insert(rule.id.clone(), Arc::new(rule.clone()));
        self.gate.forget(&rule.id);
        drop(inner);

        debug!(rule_id = %rule.id, event_type = %rule.event_type, "Rule added");
        Ok(rule)
    }

    /// Replace rule `id` wholesale, keeping its `created_at` and trigger state
    pub fn update(&self, id: &str, mut rule: AlertRule) -> Result<AlertRule> {
        rule.validate()?;
        rule.id = id.to_string();

        let mut inner = self.inner.write();
        let existing = inner
            .rules
            .get(id)
            .cloned()
            .ok_or_else(|| AlertError::not_found(EntityKind::Rule, id))?;

        rule.created_at = existing.created_at;
        rule.updated_at = Utc::now();
        if existing.event_type != rule.event_type {
            inner.unsubscribe(&existing.event_type, id);
            inner.subscribe(&rule.event_type, id);
        }
        inner.rules.insert(id.to_string(), Arc::new(rule.clone()));
        drop(inner);

        debug!(rule_id = %id, "Rule updated");
        Ok(self.with_trigger_state(rule))
    }

    /// Remove a rule, its subscription entry and its trigger state
    pub fn remove(&self, id: &str) -> Result<AlertRule> {
        let mut inner = self.inner.write();
        let removed = inner
            .rules
            .remove(id)
            .ok_or_else(|| AlertError::not_found(EntityKind::Rule, id))?;
        inner.unsubscribe(&removed.event_type, id);
        let rule = self.with_trigger_state(AlertRule::clone(&removed));
        self.gate.forget(id);
        drop(inner);

        debug!(rule_id = %id, "Rule removed");
        Ok(rule)
    }

    pub fn get(&self, id: &str) -> Result<AlertRule> {
        let rule = self
            .inner
            .read()
            .rules
            .get(id)
            .map(|r| AlertRule::clone(r))
            .ok_or_else(|| AlertError::not_found(EntityKind::Rule, id))?;
        Ok(self.with_trigger_state(rule))
    }

    /// Shared handle to the stored definition (no trigger state merged)
    pub fn get_shared(&self, id: &str) -> Option<Arc<AlertRule>> {
        self.inner.read().rules.get(id).cloned()
    }

    /// All rules ordered by creation time
    pub fn list(&self) -> Vec<AlertRule> {
        let mut rules: Vec<AlertRule> = self
            .inner
            .read()
            .rules
            .values()
            .map(|r| AlertRule::clone(r))
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rules
            .into_iter()
            .map(|r| self.with_trigger_state(r))
            .collect()
    }

    /// Rules subscribed to `event_type`, in subscription order
    pub fn subscribed(&self, event_type: &str) -> Vec<Arc<AlertRule>> {
        let inner = self.inner.read();
        inner
            .subscriptions
            .get(event_type)
            .map(|ids| ids.iter().filter_map(|id| inner.rules.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Rule ids subscribed to `event_type`
    pub fn subscription_ids(&self, event_type: &str) -> Vec<String> {
        self.inner
            .read()
            .subscriptions
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Cooldown check-and-set for one rule
    ///
    /// Refused when `rule` is no longer the stored definition for its id
    /// (removed, or removed and added again). The store lock is held across
    /// the check so `remove` cannot clear the gate in between.
    pub fn try_fire(&self, rule: &AlertRule, now: DateTime<Utc>) -> bool {
        let inner = self.inner.read();
        let current = inner
            .rules
            .get(&rule.id)
            .is_some_and(|stored| stored.created_at == rule.created_at);
        current && self.gate.try_fire(&rule.id, rule.cooldown, now)
    }

    pub fn trigger_state(&self, rule_id: &str) -> Option<TriggerState> {
        self.gate.state(rule_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().rules.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.inner.read().rules.values().filter(|r| r.enabled).count()
    }

    fn with_trigger_state(&self, mut rule: AlertRule) -> AlertRule {
        if let Some(state) = self.gate.state(&rule.id) {
            rule.last_triggered = Some(state.last_triggered);
            rule.trigger_count = state.trigger_count;
        }
        rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AlertSeverity;
    use crate::rules::AlertCondition;

    fn rule(name: &str, event_type: &str) -> AlertRule {
        AlertRule::new(name, event_type, AlertSeverity::Warning)
            .with_condition(AlertCondition::gt("price", 100.0))
            .with_message("{{price}}")
    }

    #[test]
    fn test_add_assigns_id_and_subscribes() {
        let store = RuleStore::new();
        let added = store.add(rule("a", "price_alert")).unwrap();
        assert!(!added.id.is_empty());
        assert_eq!(store.subscription_ids("price_alert"), vec![added.id.clone()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_keeps_explicit_id_and_rejects_duplicate() {
        let store = RuleStore::new();
        store.add(rule("a", "price_alert").with_id("fixed")).unwrap();
        let err = store.add(rule("b", "price_alert").with_id("fixed")).unwrap_err();
        assert!(matches!(err, AlertError::AlreadyExists { .. }));
    }

    #[test]
    fn test_add_invalid_rule_rejected() {
        let store = RuleStore::new();
        let mut bad = rule("a", "price_alert");
        bad.conditions.clear();
        assert!(store.add(bad).unwrap_err().is_validation());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_moves_subscription_and_keeps_created_at() {
        let store = RuleStore::new();
        let added = store.add(rule("a", "price_alert")).unwrap();
        let updated = store.update(&added.id, rule("a2", "volume_alert")).unwrap();

        assert_eq!(updated.created_at, added.created_at);
        assert!(updated.updated_at >= added.updated_at);
        assert_eq!(updated.name, "a2");
        assert!(store.subscription_ids("price_alert").is_empty());
        assert_eq!(store.subscription_ids("volume_alert"), vec![added.id]);
    }

    #[test]
    fn test_update_unknown_is_not_found() {
        let store = RuleStore::new();
        assert!(store.update("missing", rule("a", "x")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_clears_subscription_and_state() {
        let store = RuleStore::new();
        let added = store.add(rule("a", "price_alert")).unwrap();
        assert!(store.try_fire(&added, Utc::now()));

        store.remove(&added.id).unwrap();
        assert!(store.subscribed("price_alert").is_empty());
        assert!(store.trigger_state(&added.id).is_none());
        assert!(store.remove(&added.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_merges_trigger_state() {
        let store = RuleStore::new();
        let added = store.add(rule("a", "price_alert")).unwrap();
        let now = Utc::now();
        store.try_fire(&added, now);

        let fetched = store.get(&added.id).unwrap();
        assert_eq!(fetched.last_triggered, Some(now));
        assert_eq!(fetched.trigger_count, 1);
    }

    /// Test: a definition held across remove + re-add never fires or leaks state
    #[test]
    fn test_stale_handle_cannot_fire_after_remove() {
        let store = RuleStore::new();
        store.add(rule("a", "price_alert").with_id("r1")).unwrap();
        let held = store.get_shared("r1").unwrap();
        store.remove("r1").unwrap();

        assert!(!store.try_fire(&held, Utc::now()));
        assert!(store.trigger_state("r1").is_none());

        let readded = store.add(rule("a", "price_alert").with_id("r1")).unwrap();
        assert!(store.try_fire(&readded, Utc::now()));
        assert_eq!(store.trigger_state("r1").map(|s| s.trigger_count), Some(1));
    }

    #[test]
    fn test_update_keeps_cooldown_for_in_flight_handle() {
        let store = RuleStore::new();
        let added = store.add(rule("a", "price_alert")).unwrap();
        let held = store.get_shared(&added.id).unwrap();
        store.update(&added.id, rule("a2", "price_alert")).unwrap();
        assert!(store.try_fire(&held, Utc::now()));
    }

    #[test]
    fn test_active_count_skips_disabled() {
        let store = RuleStore::new();
        store.add(rule("a", "price_alert")).unwrap();
        store.add(rule("b", "price_alert").disabled()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_count(), 1);
        assert_eq!(store.subscribed("price_alert").len(), 2);
    }
}
