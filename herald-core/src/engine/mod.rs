//! Alert engine
//!
//! Producers push events onto a bounded event queue; a pool of event workers
//! matches them against subscribed rules and pushes alerts onto a bounded
//! alert queue; a pool of alert workers fans each alert out to its channels.
//!
//! ```text
//! process_event ─▶ [event queue] ─▶ event workers ─▶ [alert queue] ─▶ alert workers ─▶ channels
//! trigger_alert ─────────────────────────────────────┘
//! ```
//!
//! Producers never block: a full queue is reported as `QueueFull`.

pub mod alert_engine;
pub mod alert_store;
pub mod filter;
pub mod manager;
pub mod metrics;
mod workers;

pub use alert_engine::{AlertEngine, TriggerOutcome};
pub use alert_store::AlertStore;
pub use filter::AlertFilter;
pub use manager::AlertManager;
pub use metrics::{EngineMetrics, MetricsTracker};

use crate::core::{AlertEvent, Result};
use std::time::Duration;

/// Runtime parameters of an engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// When false, `process_event` accepts and discards everything
    pub enabled: bool,
    pub event_queue_size: usize,
    pub alert_queue_size: usize,
    pub event_workers: usize,
    pub alert_workers: usize,
    /// Upper bound on a single channel `send`
    pub send_timeout: Duration,
    pub cleanup_interval: Duration,
    pub metrics_interval: Duration,
    /// Alert store cap enforced by cleanup
    pub max_alerts: usize,
    /// Resolved alerts older than this are dropped by cleanup
    pub retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_queue_size: 10_000,
            alert_queue_size: 1_000,
            event_workers: 4,
            alert_workers: 2,
            send_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60 * 60),
            metrics_interval: Duration::from_secs(60),
            max_alerts: 10_000,
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl EngineConfig {
    pub fn with_queue_sizes(mut self, events: usize, alerts: usize) -> Self {
        self.event_queue_size = events;
        self.alert_queue_size = alerts;
        self
    }

    pub fn with_workers(mut self, event_workers: usize, alert_workers: usize) -> Self {
        self.event_workers = event_workers;
        self.alert_workers = alert_workers;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Anything that accepts events without blocking (the engine, or a test double)
pub trait EventSink: Send + Sync {
    fn process_event(&self, event: AlertEvent) -> Result<()>;
}
