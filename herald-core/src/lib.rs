//! Herald Core - Alerting engine for trading systems
//!
//! Herald turns market and strategy events into alerts: producers push
//! [`AlertEvent`]s, rules with conditions and cooldowns decide which events
//! become [`Alert`]s, and alerts fan out to delivery channels.
//!
//! ## Architecture
//! - **Non-blocking producers**: bounded queues, full queue = `QueueFull`
//! - **Worker pools** for rule matching and delivery
//! - **Atomic cooldown** check-and-set per rule
//! - **Isolated channels**: a failing or slow channel never blocks the others
//!
//! ## Core Modules
//! - `core`: value model, events, alerts, errors
//! - `rules`: conditions, rule definitions, cooldown gate, rule store
//! - `format`: `{{placeholder}}` templates
//! - `channels`: channel trait, registry, built-in channels, factory
//! - `engine`: alert engine, alert store, manager facade
//! - `config`: JSON configuration file
//! - `monitoring`: Prometheus metrics and HTTP exporter
//! - `resilience`: retry backoff for HTTP channels
//!
//! ## Example
//! ```no_run
//! use herald_core::prelude::*;
//!
//! # async fn run() -> herald_core::Result<()> {
//! let engine = AlertEngine::new(EngineConfig::default())?;
//! engine.register_channel(std::sync::Arc::new(ConsoleChannel::new("console")));
//! engine.add_rule(
//!     AlertRule::new("BTC high", "price_alert", AlertSeverity::Warning)
//!         .with_condition(AlertCondition::gt("price", 100_000.0))
//!         .with_message("BTC at {{price}}")
//!         .with_channel("console"),
//! )?;
//! engine.start()?;
//! engine.process_event(AlertEvent::new("price_alert", "feed").with_field("price", 101_000.0))?;
//! engine.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod rules;
pub mod format;
pub mod channels;
pub mod engine;
pub mod config;
pub mod monitoring;
pub mod resilience;
pub mod utils;

// Test doubles and builders, also used by downstream crates' tests
pub mod testing;

pub use crate::core::{
    Alert, AlertError, AlertEvent, AlertSeverity, DeliveryError, EngineState, Fields, Result,
    Value,
};
pub use channels::{Channel, ChannelFactory, ChannelRegistry};
pub use config::AlertingConfig;
pub use engine::{AlertEngine, AlertFilter, AlertManager, EngineConfig, EventSink, TriggerOutcome};
pub use format::MessageFormatter;
pub use rules::{AlertCondition, AlertRule, ConditionOperator};

pub mod prelude {
    pub use crate::channels::{Channel, ChannelFactory, ConsoleChannel, FileChannel, WebSocketChannel};
    pub use crate::config::AlertingConfig;
    pub use crate::core::{Alert, AlertError, AlertEvent, AlertSeverity, Fields, Value};
    pub use crate::engine::{
        AlertEngine, AlertFilter, AlertManager, EngineConfig, EventSink, TriggerOutcome,
    };
    pub use crate::fields;
    pub use crate::rules::{AlertCondition, AlertRule, ConditionOperator};
}
