//! Test doubles and builders
//!
//! Provides:
//! - Channels: `RecordingChannel`, `FailingChannel`, `SlowChannel`
//! - `RecordingSink`: an `EventSink` that keeps every event
//! - Rule, event and alert builders
//! - `wait_until` for polling asynchronous outcomes

use crate::channels::Channel;
use crate::core::{Alert, AlertEvent, AlertSeverity, DeliveryError, Result};
use crate::engine::EventSink;
use crate::fields;
use crate::rules::{AlertCondition, AlertRule};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Keeps every alert it is asked to deliver
pub struct RecordingChannel {
    name: String,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().len()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn send(&self, alert: &Alert) -> std::result::Result<(), DeliveryError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "recording"
    }
}

/// Rejects every delivery, counting attempts
pub struct FailingChannel {
    name: String,
    attempts: AtomicUsize,
}

impl FailingChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for FailingChannel {
    async fn send(&self, _alert: &Alert) -> std::result::Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DeliveryError::Rejected(format!("{} always fails", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "failing"
    }
}

/// Sleeps before every delivery
pub struct SlowChannel {
    name: String,
    delay: Duration,
    delivered: AtomicUsize,
}

impl SlowChannel {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            delivered: AtomicUsize::new(0),
        }
    }

    /// Sends that ran to completion
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for SlowChannel {
    async fn send(&self, _alert: &Alert) -> std::result::Result<(), DeliveryError> {
        tokio::time::sleep(self.delay).await;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "slow"
    }
}

/// Event sink that records instead of evaluating
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AlertEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<AlertEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn process_event(&self, event: AlertEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// `price > threshold` rule on `price_alert` events, no cooldown
pub fn price_rule(threshold: f64) -> AlertRule {
    AlertRule::new("Price above threshold", "price_alert", AlertSeverity::Warning)
        .with_condition(AlertCondition::gt("price", threshold))
        .with_message("{{symbol}} at {{price}}")
        .with_cooldown(Duration::ZERO)
}

pub fn price_event(symbol: &str, price: f64) -> AlertEvent {
    AlertEvent::new("price_alert", "test-feed")
        .with_field("symbol", symbol)
        .with_field("price", price)
}

/// Fully populated alert for channel and store tests
pub fn sample_alert(severity: AlertSeverity) -> Alert {
    Alert {
        id: "alert-1".to_string(),
        rule_id: "rule-1".to_string(),
        alert_type: "price_alert".to_string(),
        severity,
        title: "BTC above 100".to_string(),
        message: "BTC-USD trading at 105.5".to_string(),
        data: fields! { "price" => 105.5 },
        created_at: Utc::now(),
        channels: vec!["console".to_string()],
        acknowledged: false,
        acknowledged_at: None,
        resolved: false,
        resolved_at: None,
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
