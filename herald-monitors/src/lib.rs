//! Herald Monitors - event producers for the alert engine
//!
//! Two monitors watch external state and emit [`AlertEvent`]s into any
//! [`EventSink`] (usually an [`AlertEngine`]):
//!
//! - [`MarketEventMonitor`]: price, volume, volatility and cross-exchange
//!   arbitrage thresholds per `symbol@exchange`
//! - [`StrategySignalMonitor`]: signal confidence, performance and risk
//!   thresholds per strategy
//!
//! Every threshold fires once when its condition starts holding and re-arms
//! when a later check finds it false (or on an explicit `reset`). Checks run
//! on fixed intervals after `start`, or can be called directly.
//!
//! ```no_run
//! use herald_monitors::{MarketEventMonitor, MarketWatch, Threshold};
//! use std::sync::Arc;
//!
//! # async fn run(engine: Arc<herald_core::AlertEngine>) -> herald_core::Result<()> {
//! let monitor = Arc::new(MarketEventMonitor::default());
//! monitor.add_watch(MarketWatch::new("BTC-USD", "coinbase").price(Threshold::above(100_000.0)));
//! monitor.start(engine)?;
//! monitor.update_price("BTC-USD", "coinbase", 101_000.0);
//! # monitor.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! [`AlertEvent`]: herald_core::AlertEvent
//! [`EventSink`]: herald_core::EventSink
//! [`AlertEngine`]: herald_core::AlertEngine

pub mod market;
pub mod periodic;
pub mod strategy;
pub mod threshold;
pub mod volatility;

pub use market::{market_key, MarketEventMonitor, MarketMonitorConfig, MarketWatch};
pub use periodic::PeriodicTasks;
pub use strategy::{
    MetricThreshold, PerformanceMetric, PerformanceSnapshot, RiskMetric, RiskSnapshot, Signal,
    SignalAction, SignalThreshold, StrategyMonitorConfig, StrategySignalMonitor, StrategyWatch,
};
pub use threshold::{Reading, Threshold, ThresholdOperator, Trigger};
pub use volatility::RollingVolatility;
