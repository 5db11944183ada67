//! The alert engine: rule matching, cooldown, queues and worker lifecycle

use super::alert_store::AlertStore;
use super::filter::AlertFilter;
use super::metrics::{EngineMetrics, MetricsTracker};
use super::workers;
use super::{EngineConfig, EventSink};
use crate::channels::{Channel, ChannelInfo, ChannelRegistry};
use crate::core::{
    Alert, AlertError, AlertEvent, EngineState, EntityKind, Fields, QueueKind, Result, Value,
};
use crate::format::MessageFormatter;
use crate::monitoring::MetricsRegistry;
use crate::rules::{matches_all, AlertRule, RuleStore};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a manual trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Alert created and queued for delivery
    Fired(String),
    Disabled,
    ConditionsNotMet,
    CoolingDown,
}

impl TriggerOutcome {
    pub fn alert_id(&self) -> Option<&str> {
        match self {
            Self::Fired(id) => Some(id),
            _ => None,
        }
    }
}

pub(crate) type SharedReceiver<T> = Arc<AsyncMutex<mpsc::Receiver<T>>>;

/// State shared between the engine handle and its workers
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) rules: RuleStore,
    pub(crate) channels: ChannelRegistry,
    pub(crate) alerts: AlertStore,
    pub(crate) formatter: Arc<MessageFormatter>,
    pub(crate) metrics: MetricsTracker,
    state: RwLock<EngineState>,
    event_tx: mpsc::Sender<AlertEvent>,
    alert_tx: mpsc::Sender<Alert>,
}

struct Lifecycle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    event_rx: SharedReceiver<AlertEvent>,
    alert_rx: SharedReceiver<Alert>,
}

pub struct AlertEngine {
    shared: Arc<EngineShared>,
    lifecycle: Mutex<Lifecycle>,
}

impl AlertEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let registry = MetricsRegistry::new()
            .map_err(|e| AlertError::Config(format!("metrics registry: {}", e)))?;
        Ok(Self::with_parts(config, Arc::new(MessageFormatter::new()), registry))
    }

    /// Engine sharing an existing formatter and Prometheus registry
    pub fn with_parts(
        config: EngineConfig,
        formatter: Arc<MessageFormatter>,
        registry: MetricsRegistry,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_size.max(1));
        let (alert_tx, alert_rx) = mpsc::channel(config.alert_queue_size.max(1));

        let shared = Arc::new(EngineShared {
            config,
            rules: RuleStore::new(),
            channels: ChannelRegistry::new(),
            alerts: AlertStore::new(),
            formatter,
            metrics: MetricsTracker::new(registry),
            state: RwLock::new(EngineState::Created),
            event_tx,
            alert_tx,
        });

        Self {
            shared,
            lifecycle: Mutex::new(Lifecycle {
                cancel: CancellationToken::new(),
                tasks: Vec::new(),
                event_rx: Arc::new(AsyncMutex::new(event_rx)),
                alert_rx: Arc::new(AsyncMutex::new(alert_rx)),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn formatter(&self) -> &Arc<MessageFormatter> {
        &self.shared.formatter
    }

    pub fn prometheus(&self) -> &MetricsRegistry {
        self.shared.metrics.prometheus()
    }

    pub fn state(&self) -> EngineState {
        *self.shared.state.read()
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Spawn the worker pools and periodic loops on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AlertError::NoRuntime("start the alert engine"))?;

        let mut state = self.shared.state.write();
        if *state != EngineState::Created {
            return Err(AlertError::Lifecycle {
                operation: "start",
                state: *state,
            });
        }

        let mut lifecycle = self.lifecycle.lock();
        let cancel = lifecycle.cancel.clone();
        let config = &self.shared.config;

        for id in 0..config.event_workers.max(1) {
            let handle = runtime.spawn(workers::event_worker(
                id,
                Arc::clone(&self.shared),
                Arc::clone(&lifecycle.event_rx),
                cancel.clone(),
            ));
            lifecycle.tasks.push(handle);
        }
        for id in 0..config.alert_workers.max(1) {
            let handle = runtime.spawn(workers::alert_worker(
                id,
                Arc::clone(&self.shared),
                Arc::clone(&lifecycle.alert_rx),
                cancel.clone(),
            ));
            lifecycle.tasks.push(handle);
        }
        lifecycle.tasks.push(runtime.spawn(workers::cleanup_loop(
            Arc::clone(&self.shared),
            cancel.clone(),
        )));
        lifecycle.tasks.push(runtime.spawn(workers::metrics_loop(
            Arc::clone(&self.shared),
            cancel,
        )));

        *state = EngineState::Running;
        info!(
            event_workers = config.event_workers.max(1),
            alert_workers = config.alert_workers.max(1),
            event_queue = config.event_queue_size,
            alert_queue = config.alert_queue_size,
            "Alert engine started"
        );
        Ok(())
    }

    /// Cancel every worker and wait for all of them to exit
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.shared.state.write();
            if *state != EngineState::Running {
                return Err(AlertError::Lifecycle {
                    operation: "stop",
                    state: *state,
                });
            }
            *state = EngineState::Stopping;
        }

        let (tasks, event_rx, alert_rx) = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.cancel.cancel();
            (
                std::mem::take(&mut lifecycle.tasks),
                Arc::clone(&lifecycle.event_rx),
                Arc::clone(&lifecycle.alert_rx),
            )
        };

        info!(tasks = tasks.len(), "Stopping alert engine");
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Engine task ended abnormally");
            }
        }

        event_rx.lock().await.close();
        alert_rx.lock().await.close();

        *self.shared.state.write() = EngineState::Stopped;
        info!("Alert engine stopped");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Producers
    // ---------------------------------------------------------------------

    /// Queue an event for rule matching without blocking
    pub fn process_event(&self, event: AlertEvent) -> Result<()> {
        if !self.shared.config.enabled {
            return Ok(());
        }
        self.shared.ensure_accepting("process events")?;

        match self.shared.event_tx.try_send(event) {
            Ok(()) => {
                self.shared.metrics.event_accepted();
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                self.shared.metrics.event_dropped();
                warn!(event_id = %event.id, event_type = %event.event_type, "Event queue full, rejecting event");
                Err(AlertError::QueueFull(QueueKind::Event))
            }
            Err(TrySendError::Closed(_)) => Err(AlertError::Lifecycle {
                operation: "process events",
                state: self.state(),
            }),
        }
    }

    /// Evaluate one rule against `data` directly, bypassing the event queue
    pub fn trigger_alert(&self, rule_id: &str, data: Fields) -> Result<TriggerOutcome> {
        self.trigger_alert_at(rule_id, data, Utc::now())
    }

    /// [`trigger_alert`](Self::trigger_alert) with an explicit clock
    pub fn trigger_alert_at(
        &self,
        rule_id: &str,
        data: Fields,
        now: DateTime<Utc>,
    ) -> Result<TriggerOutcome> {
        self.shared.ensure_accepting("trigger alerts")?;
        let rule = self
            .shared
            .rules
            .get_shared(rule_id)
            .ok_or_else(|| AlertError::not_found(EntityKind::Rule, rule_id))?;

        if !rule.enabled {
            return Ok(TriggerOutcome::Disabled);
        }
        if !matches_all(&rule.conditions, &data) {
            return Ok(TriggerOutcome::ConditionsNotMet);
        }
        if !self.shared.rules.try_fire(&rule, now) {
            debug!(rule_id = %rule.id, "Manual trigger suppressed by cooldown");
            return Ok(TriggerOutcome::CoolingDown);
        }

        let mut fields = data;
        fields
            .entry("source".to_string())
            .or_insert_with(|| Value::from("manual"));
        let alert = self.shared.build_alert(&rule, fields, None, now);
        let id = alert.id.clone();
        self.shared.enqueue_alert(alert)?;
        Ok(TriggerOutcome::Fired(id))
    }

    // ---------------------------------------------------------------------
    // Rules
    // ---------------------------------------------------------------------

    pub fn add_rule(&self, rule: AlertRule) -> Result<AlertRule> {
        let added = self.shared.rules.add(rule)?;
        self.shared.refresh_rule_metrics();
        info!(rule_id = %added.id, name = %added.name, event_type = %added.event_type, "Rule added");
        Ok(added)
    }

    pub fn update_rule(&self, id: &str, rule: AlertRule) -> Result<AlertRule> {
        let updated = self.shared.rules.update(id, rule)?;
        self.shared.refresh_rule_metrics();
        Ok(updated)
    }

    pub fn remove_rule(&self, id: &str) -> Result<AlertRule> {
        let removed = self.shared.rules.remove(id)?;
        self.shared.refresh_rule_metrics();
        info!(rule_id = %id, "Rule removed");
        Ok(removed)
    }

    pub fn get_rule(&self, id: &str) -> Result<AlertRule> {
        self.shared.rules.get(id)
    }

    pub fn get_rules(&self) -> Vec<AlertRule> {
        self.shared.rules.list()
    }

    // ---------------------------------------------------------------------
    // Channels
    // ---------------------------------------------------------------------

    /// Register under `channel.name()`; an existing channel of that name is replaced
    pub fn register_channel(&self, channel: Arc<dyn Channel>) {
        self.shared.channels.register(channel);
    }

    pub fn remove_channel(&self, name: &str) -> Result<()> {
        self.shared.channels.remove(name).map(|_| ())
    }

    pub fn get_channels(&self) -> Vec<ChannelInfo> {
        self.shared.channels.list()
    }

    pub fn get_channel(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.shared.channels.get(name)
    }

    // ---------------------------------------------------------------------
    // Alerts
    // ---------------------------------------------------------------------

    pub fn get_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        self.shared.alerts.query(filter)
    }

    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.shared.alerts.query(&AlertFilter::new().resolved(false))
    }

    pub fn get_alert(&self, id: &str) -> Result<Alert> {
        self.shared.alerts.get(id)
    }

    pub fn acknowledge_alert(&self, id: &str) -> Result<Alert> {
        let alert = self.shared.alerts.acknowledge(id, Utc::now())?;
        self.shared.refresh_active_alerts();
        info!(alert_id = %id, "Alert acknowledged");
        Ok(alert)
    }

    /// Resolving an already resolved alert succeeds and keeps the original `resolved_at`
    pub fn resolve_alert(&self, id: &str) -> Result<Alert> {
        let alert = self.shared.alerts.resolve(id, Utc::now())?;
        self.shared.refresh_active_alerts();
        info!(alert_id = %id, "Alert resolved");
        Ok(alert)
    }

    /// Run one retention pass now; returns the number of alerts dropped
    pub fn cleanup_alerts(&self, now: DateTime<Utc>) -> usize {
        self.shared.cleanup_alerts(now)
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.shared.refresh_gauges();
        self.shared.metrics.snapshot()
    }
}

impl EventSink for AlertEngine {
    fn process_event(&self, event: AlertEvent) -> Result<()> {
        AlertEngine::process_event(self, event)
    }
}

impl Drop for AlertEngine {
    fn drop(&mut self) {
        self.lifecycle.lock().cancel.cancel();
    }
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("state", &self.state())
            .field("rules", &self.shared.rules.len())
            .field("channels", &self.shared.channels.len())
            .field("alerts", &self.shared.alerts.len())
            .finish()
    }
}

impl EngineShared {
    fn ensure_accepting(&self, operation: &'static str) -> Result<()> {
        let state = *self.state.read();
        match state {
            EngineState::Created | EngineState::Running => Ok(()),
            EngineState::Stopping | EngineState::Stopped => {
                Err(AlertError::Lifecycle { operation, state })
            }
        }
    }

    /// Match one event against every subscribed rule
    pub(crate) fn handle_event(&self, event: &AlertEvent) {
        let started = Instant::now();
        let now = Utc::now();
        let fields = event.evaluation_fields();

        for rule in self.rules.subscribed(&event.event_type) {
            if !rule.enabled {
                continue;
            }
            if !matches_all(&rule.conditions, &fields) {
                continue;
            }
            if !self.rules.try_fire(&rule, now) {
                debug!(rule_id = %rule.id, event_id = %event.id, "Rule in cooldown, skipping");
                continue;
            }

            let alert = self.build_alert(&rule, fields.clone(), Some(event), now);
            if let Err(e) = self.enqueue_alert(alert) {
                warn!(rule_id = %rule.id, event_id = %event.id, error = %e, "Dropping alert");
            }
        }

        self.metrics.event_processed(started.elapsed());
    }

    pub(crate) fn build_alert(
        &self,
        rule: &AlertRule,
        mut data: Fields,
        event: Option<&AlertEvent>,
        now: DateTime<Utc>,
    ) -> Alert {
        let message = self
            .formatter
            .render_message(rule.template.as_deref(), &rule.message, &data);

        data.insert("rule_id".to_string(), Value::from(rule.id.as_str()));
        data.insert("rule_name".to_string(), Value::from(rule.name.as_str()));
        if let Some(event) = event {
            data.insert("event_id".to_string(), Value::from(event.id.as_str()));
            data.insert("source".to_string(), Value::from(event.source.as_str()));
        }

        Alert {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            alert_type: rule.event_type.clone(),
            severity: rule.severity,
            title: rule.name.clone(),
            message,
            data,
            created_at: now,
            channels: rule.channels.clone(),
            acknowledged: false,
            acknowledged_at: None,
            resolved: false,
            resolved_at: None,
        }
    }

    /// Store the alert and queue it for delivery; a full queue un-stores it
    pub(crate) fn enqueue_alert(&self, alert: Alert) -> Result<()> {
        let id = alert.id.clone();
        let alert_type = alert.alert_type.clone();
        let severity = alert.severity;
        self.alerts.insert(alert.clone());

        match self.alert_tx.try_send(alert) {
            Ok(()) => {
                self.metrics.alert_created(&alert_type, severity);
                self.refresh_active_alerts();
                debug!(alert_id = %id, alert_type = %alert_type, "Alert queued");
                Ok(())
            }
            Err(e) => {
                self.alerts.remove(&id);
                self.metrics.alert_dropped();
                match e {
                    TrySendError::Full(_) => Err(AlertError::QueueFull(QueueKind::Alert)),
                    TrySendError::Closed(_) => Err(AlertError::Lifecycle {
                        operation: "queue alerts",
                        state: *self.state.read(),
                    }),
                }
            }
        }
    }

    pub(crate) fn cleanup_alerts(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let dropped = self.alerts.cleanup(now, retention, self.config.max_alerts);
        if dropped > 0 {
            info!(dropped, remaining = self.alerts.len(), "Alert retention cleanup");
        }
        self.refresh_active_alerts();
        dropped
    }

    pub(crate) fn refresh_active_alerts(&self) {
        self.metrics.set_active_alerts(self.alerts.active_count());
    }

    pub(crate) fn refresh_rule_metrics(&self) {
        self.metrics
            .set_rules(self.rules.len(), self.rules.active_count());
    }

    pub(crate) fn refresh_gauges(&self) {
        let events = self.event_tx.max_capacity() - self.event_tx.capacity();
        let alerts = self.alert_tx.max_capacity() - self.alert_tx.capacity();
        self.metrics.set_queue_depths(events, alerts);
        self.refresh_active_alerts();
        self.refresh_rule_metrics();
    }
}
