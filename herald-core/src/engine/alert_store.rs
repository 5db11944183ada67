//! In-memory store of created alerts

use super::filter::AlertFilter;
use crate::core::{Alert, AlertError, EntityKind, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct AlertStore {
    alerts: RwLock<HashMap<String, Alert>>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, alert: Alert) {
        self.alerts.write().insert(alert.id.clone(), alert);
    }

    pub fn remove(&self, id: &str) -> Option<Alert> {
        self.alerts.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Result<Alert> {
        self.alerts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AlertError::not_found(EntityKind::Alert, id))
    }

    /// Alerts matching `filter`, oldest first
    pub fn query(&self, filter: &AlertFilter) -> Vec<Alert> {
        let mut matched: Vec<Alert> = self
            .alerts
            .read()
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        matched
    }

    pub fn acknowledge(&self, id: &str, now: DateTime<Utc>) -> Result<Alert> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .get_mut(id)
            .ok_or_else(|| AlertError::not_found(EntityKind::Alert, id))?;
        alert.acknowledge(now)?;
        Ok(alert.clone())
    }

    /// Resolve an alert. Resolving an already resolved alert is a no-op.
    pub fn resolve(&self, id: &str, now: DateTime<Utc>) -> Result<Alert> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .get_mut(id)
            .ok_or_else(|| AlertError::not_found(EntityKind::Alert, id))?;
        alert.resolve(now);
        Ok(alert.clone())
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.alerts.read().values().filter(|a| a.is_active()).count()
    }

    /// Retention pass; returns how many alerts were dropped
    ///
    /// 1. resolved alerts whose `resolved_at` is older than `retention`
    /// 2. while more than `max_alerts` remain: oldest resolved first, then oldest overall
    pub fn cleanup(&self, now: DateTime<Utc>, retention: ChronoDuration, max_alerts: usize) -> usize {
        let mut alerts = self.alerts.write();
        let before = alerts.len();
        let cutoff = now - retention;

        alerts.retain(|_, a| !matches!(a.resolved_at, Some(at) if a.resolved && at < cutoff));

        if alerts.len() > max_alerts {
            let excess = alerts.len() - max_alerts;
            let mut order: Vec<(bool, DateTime<Utc>, String)> = alerts
                .values()
                .map(|a| (a.is_active(), a.created_at, a.id.clone()))
                .collect();
            // resolved (false) sorts before active (true), then oldest first
            order.sort();
            for (_, _, id) in order.into_iter().take(excess) {
                alerts.remove(&id);
            }
        }

        before - alerts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AlertSeverity;
    use crate::testing::sample_alert;

    fn alert_at(id: &str, created: DateTime<Utc>, alert_type: &str) -> Alert {
        let mut alert = sample_alert(AlertSeverity::Warning);
        alert.id = id.to_string();
        alert.created_at = created;
        alert.alert_type = alert_type.to_string();
        alert
    }

    #[test]
    fn test_acknowledge_and_resolve_unknown() {
        let store = AlertStore::new();
        assert!(store.acknowledge("x", Utc::now()).unwrap_err().is_not_found());
        assert!(store.resolve("x", Utc::now()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_sorted_by_creation() {
        let store = AlertStore::new();
        let now = Utc::now();
        store.insert(alert_at("b", now, "price"));
        store.insert(alert_at("a", now - ChronoDuration::seconds(5), "price"));
        let ids: Vec<String> = store.query(&AlertFilter::default()).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_cleanup_drops_expired_resolved() {
        let store = AlertStore::new();
        let now = Utc::now();
        store.insert(alert_at("old", now - ChronoDuration::days(40), "price"));
        store.insert(alert_at("fresh", now, "price"));
        store.resolve("old", now - ChronoDuration::days(31)).unwrap();

        let dropped = store.cleanup(now, ChronoDuration::days(30), 100);
        assert_eq!(dropped, 1);
        assert!(store.get("old").is_err());
        assert!(store.get("fresh").is_ok());
    }

    #[test]
    fn test_cleanup_keeps_unresolved_regardless_of_age() {
        let store = AlertStore::new();
        let now = Utc::now();
        store.insert(alert_at("ancient", now - ChronoDuration::days(400), "price"));
        assert_eq!(store.cleanup(now, ChronoDuration::days(30), 100), 0);
    }

    #[test]
    fn test_cleanup_cap_prefers_resolved() {
        let store = AlertStore::new();
        let now = Utc::now();
        store.insert(alert_at("active-old", now - ChronoDuration::seconds(30), "price"));
        store.insert(alert_at("resolved-new", now - ChronoDuration::seconds(10), "price"));
        store.insert(alert_at("active-new", now, "price"));
        store.resolve("resolved-new", now).unwrap();

        assert_eq!(store.cleanup(now, ChronoDuration::days(30), 2), 1);
        assert!(store.get("resolved-new").is_err());

        assert_eq!(store.cleanup(now, ChronoDuration::days(30), 1), 1);
        assert!(store.get("active-old").is_err());
        assert!(store.get("active-new").is_ok());
    }
}
