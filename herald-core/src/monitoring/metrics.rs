//! Prometheus metrics for the alerting engine
//!
//! Two metric families:
//! - Alerting activity (events in, alerts created, deliveries per channel)
//! - Engine state gauges (queue depths, active rules and alerts)
//!
//! Each registry owns its own `prometheus::Registry` so several engines (or
//! tests) in one process never collide on metric names.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use tracing::debug;

const NAMESPACE: &str = "herald";

/// Central registry for all Prometheus metrics
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    alerting: Arc<AlertingMetrics>,
    engine: Arc<EngineGauges>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());
        let alerting = Arc::new(AlertingMetrics::new(&registry)?);
        let engine = Arc::new(EngineGauges::new(&registry)?);

        debug!("Prometheus metrics registry initialized");

        Ok(Self {
            registry,
            alerting,
            engine,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn alerting(&self) -> &AlertingMetrics {
        &self.alerting
    }

    pub fn engine(&self) -> &EngineGauges {
        &self.engine
    }

    /// Text exposition format of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

/// Counters for events, alerts and deliveries
pub struct AlertingMetrics {
    /// Alerts created, by type and severity
    pub alerts_total: IntCounterVec,
    /// Events accepted onto the event queue
    pub events_total: IntCounter,
    /// Events rejected because the event queue was full
    pub events_dropped_total: IntCounter,
    /// Alerts rejected because the alert queue was full
    pub alerts_dropped_total: IntCounter,
    /// Successful channel deliveries
    pub deliveries_total: IntCounterVec,
    /// Failed channel deliveries (errors and timeouts)
    pub delivery_failures_total: IntCounterVec,
    /// Time spent evaluating rules for one event
    pub event_processing_seconds: Histogram,
}

impl AlertingMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let alerts_total = IntCounterVec::new(
            Opts::new("alerts_total", "Total number of alerts created").namespace(NAMESPACE),
            &["type", "severity"],
        )?;
        registry.register(Box::new(alerts_total.clone()))?;

        let events_total = IntCounter::with_opts(
            Opts::new("events_total", "Total number of events accepted").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let events_dropped_total = IntCounter::with_opts(
            Opts::new(
                "events_dropped_total",
                "Events rejected because the event queue was full",
            )
            .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(events_dropped_total.clone()))?;

        let alerts_dropped_total = IntCounter::with_opts(
            Opts::new(
                "alerts_dropped_total",
                "Alerts rejected because the alert queue was full",
            )
            .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(alerts_dropped_total.clone()))?;

        let deliveries_total = IntCounterVec::new(
            Opts::new("deliveries_total", "Successful channel deliveries").namespace(NAMESPACE),
            &["channel"],
        )?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let delivery_failures_total = IntCounterVec::new(
            Opts::new("delivery_failures_total", "Failed channel deliveries").namespace(NAMESPACE),
            &["channel"],
        )?;
        registry.register(Box::new(delivery_failures_total.clone()))?;

        let event_processing_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "event_processing_seconds",
                "Time spent evaluating rules for one event",
            )
            .namespace(NAMESPACE)
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(event_processing_seconds.clone()))?;

        Ok(Self {
            alerts_total,
            events_total,
            events_dropped_total,
            alerts_dropped_total,
            deliveries_total,
            delivery_failures_total,
            event_processing_seconds,
        })
    }
}

/// Point-in-time engine gauges
pub struct EngineGauges {
    pub event_queue_depth: IntGauge,
    pub alert_queue_depth: IntGauge,
    pub active_rules: IntGauge,
    pub active_alerts: IntGauge,
}

impl EngineGauges {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let event_queue_depth = IntGauge::with_opts(
            Opts::new("event_queue_depth", "Events waiting for an event worker").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(event_queue_depth.clone()))?;

        let alert_queue_depth = IntGauge::with_opts(
            Opts::new("alert_queue_depth", "Alerts waiting for an alert worker").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(alert_queue_depth.clone()))?;

        let active_rules = IntGauge::with_opts(
            Opts::new("active_rules", "Enabled rules").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(active_rules.clone()))?;

        let active_alerts = IntGauge::with_opts(
            Opts::new("active_alerts", "Unresolved alerts").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(active_alerts.clone()))?;

        Ok(Self {
            event_queue_depth,
            alert_queue_depth,
            active_rules,
            active_alerts,
        })
    }
}
