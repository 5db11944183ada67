//! Engine counters
//!
//! All counters live behind one mutex and are read through a snapshot copy.
//! Every update is mirrored into the Prometheus registry.

use crate::core::AlertSeverity;
use crate::monitoring::MetricsRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineMetrics {
    pub total_rules: usize,
    pub active_rules: usize,
    /// Alerts created
    pub total_alerts: u64,
    /// Alerts that completed fan-out (regardless of per-channel outcome)
    pub processed_alerts: u64,
    /// Failed channel deliveries plus alerts dropped on a full alert queue
    pub failed_alerts: u64,
    /// Events rejected on a full event queue
    pub dropped_events: u64,
    pub events_processed: u64,
    pub alerts_by_type: HashMap<String, u64>,
    pub alerts_by_severity: HashMap<AlertSeverity, u64>,
    /// Successful deliveries per channel
    pub alerts_by_channel: HashMap<String, u64>,
    pub channel_failures: HashMap<String, u64>,
    pub total_processing_time: Duration,
    pub last_processed: Option<DateTime<Utc>>,
    pub event_queue_depth: usize,
    pub alert_queue_depth: usize,
}

impl EngineMetrics {
    /// Mean rule-evaluation time per processed event
    pub fn avg_processing_time(&self) -> Duration {
        if self.events_processed == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_processing_time.as_secs_f64() / self.events_processed as f64)
    }
}

pub struct MetricsTracker {
    state: Mutex<EngineMetrics>,
    prometheus: MetricsRegistry,
}

impl MetricsTracker {
    pub fn new(prometheus: MetricsRegistry) -> Self {
        Self {
            state: Mutex::new(EngineMetrics::default()),
            prometheus,
        }
    }

    pub fn prometheus(&self) -> &MetricsRegistry {
        &self.prometheus
    }

    pub fn snapshot(&self) -> EngineMetrics {
        self.state.lock().clone()
    }

    pub fn set_rules(&self, total: usize, active: usize) {
        {
            let mut state = self.state.lock();
            state.total_rules = total;
            state.active_rules = active;
        }
        self.prometheus.engine().active_rules.set(active as i64);
    }

    pub fn set_queue_depths(&self, events: usize, alerts: usize) {
        {
            let mut state = self.state.lock();
            state.event_queue_depth = events;
            state.alert_queue_depth = alerts;
        }
        let gauges = self.prometheus.engine();
        gauges.event_queue_depth.set(events as i64);
        gauges.alert_queue_depth.set(alerts as i64);
    }

    pub fn set_active_alerts(&self, active: usize) {
        self.prometheus.engine().active_alerts.set(active as i64);
    }

    pub fn event_accepted(&self) {
        self.prometheus.alerting().events_total.inc();
    }

    pub fn event_dropped(&self) {
        self.state.lock().dropped_events += 1;
        self.prometheus.alerting().events_dropped_total.inc();
    }

    pub fn event_processed(&self, elapsed: Duration) {
        {
            let mut state = self.state.lock();
            state.events_processed += 1;
            state.total_processing_time += elapsed;
            state.last_processed = Some(Utc::now());
        }
        self.prometheus
            .alerting()
            .event_processing_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn alert_created(&self, alert_type: &str, severity: AlertSeverity) {
        {
            let mut state = self.state.lock();
            state.total_alerts += 1;
            *state.alerts_by_type.entry(alert_type.to_string()).or_insert(0) += 1;
            *state.alerts_by_severity.entry(severity).or_insert(0) += 1;
        }
        self.prometheus
            .alerting()
            .alerts_total
            .with_label_values(&[alert_type, severity.as_str()])
            .inc();
    }

    /// Alert could not be queued for delivery
    pub fn alert_dropped(&self) {
        self.state.lock().failed_alerts += 1;
        self.prometheus.alerting().alerts_dropped_total.inc();
    }

    pub fn delivery_succeeded(&self, channel: &str) {
        *self
            .state
            .lock()
            .alerts_by_channel
            .entry(channel.to_string())
            .or_insert(0) += 1;
        self.prometheus
            .alerting()
            .deliveries_total
            .with_label_values(&[channel])
            .inc();
    }

    pub fn delivery_failed(&self, channel: &str) {
        {
            let mut state = self.state.lock();
            state.failed_alerts += 1;
            *state.channel_failures.entry(channel.to_string()).or_insert(0) += 1;
        }
        self.prometheus
            .alerting()
            .delivery_failures_total
            .with_label_values(&[channel])
            .inc();
    }

    pub fn alert_processed(&self) {
        let mut state = self.state.lock();
        state.processed_alerts += 1;
        state.last_processed = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> MetricsTracker {
        MetricsTracker::new(MetricsRegistry::new().unwrap())
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let tracker = tracker();
        let before = tracker.snapshot();
        tracker.alert_created("price_alert", AlertSeverity::Warning);
        assert_eq!(before.total_alerts, 0);
        assert_eq!(tracker.snapshot().total_alerts, 1);
    }

    #[test]
    fn test_delivery_counts() {
        let tracker = tracker();
        tracker.delivery_succeeded("a");
        tracker.delivery_failed("b");
        tracker.alert_processed();

        let snap = tracker.snapshot();
        assert_eq!(snap.alerts_by_channel.get("a"), Some(&1));
        assert_eq!(snap.channel_failures.get("b"), Some(&1));
        assert_eq!(snap.failed_alerts, 1);
        assert_eq!(snap.processed_alerts, 1);
        assert_eq!(
            tracker
                .prometheus()
                .alerting()
                .delivery_failures_total
                .with_label_values(&["b"])
                .get(),
            1
        );
    }

    #[test]
    fn test_avg_processing_time() {
        let tracker = tracker();
        tracker.event_processed(Duration::from_millis(2));
        tracker.event_processed(Duration::from_millis(4));
        let avg = tracker.snapshot().avg_processing_time();
        assert!((avg.as_secs_f64() - 0.003).abs() < 1e-9, "avg was {avg:?}");
    }

    #[test]
    fn test_avg_processing_time_with_huge_count() {
        let snap = EngineMetrics {
            events_processed: 1 << 32,
            total_processing_time: Duration::from_secs(1 << 32),
            ..Default::default()
        };
        assert_eq!(snap.avg_processing_time(), Duration::from_secs(1));
        assert_eq!(EngineMetrics::default().avg_processing_time(), Duration::ZERO);
    }

    /// Test: queue drops are attributed to the queue that was full
    #[test]
    fn test_dropped_counters_are_separate() {
        let tracker = tracker();
        tracker.event_dropped();
        tracker.alert_dropped();
        tracker.alert_dropped();

        let snap = tracker.snapshot();
        assert_eq!(snap.dropped_events, 1);
        assert_eq!(snap.failed_alerts, 2);
        let alerting = tracker.prometheus().alerting();
        assert_eq!(alerting.events_dropped_total.get(), 1);
        assert_eq!(alerting.alerts_dropped_total.get(), 2);
    }
}
