//! Strategy signal monitor
//!
//! Watches keyed by strategy name. Signals are queued as they arrive and
//! drained by the signal check; performance and risk snapshots keep only
//! the latest value plus the one seen by the previous check.

use crate::market::emit;
use crate::periodic::{already_running, PeriodicTasks};
use crate::threshold::{Reading, Threshold, Trigger};
use chrono::Utc;
use herald_core::rules::AlertCondition;
use herald_core::{AlertEvent, AlertRule, EventSink, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const STRATEGY_SIGNAL: &str = "strategy_signal";
pub const STRATEGY_PERFORMANCE: &str = "strategy_performance";
pub const STRATEGY_RISK: &str = "strategy_risk";

/// Pending signals kept per strategy between two checks
pub const MAX_PENDING_SIGNALS: usize = 1024;

/// `watch_action` of a signal watch that accepts every action
pub const ANY_ACTION: &str = "any";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
    Close,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Hold => "hold",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trading signal emitted by a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub action: SignalAction,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub price: f64,
}

impl Signal {
    pub fn new(symbol: impl Into<String>, action: SignalAction, confidence: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            confidence,
            price,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub pnl: f64,
    pub win_rate: f64,
    pub drawdown: f64,
    pub sharpe: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub exposure: f64,
    pub var: f64,
    pub leverage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMetric {
    Pnl,
    WinRate,
    Drawdown,
    Sharpe,
}

impl PerformanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pnl => "pnl",
            Self::WinRate => "win_rate",
            Self::Drawdown => "drawdown",
            Self::Sharpe => "sharpe",
        }
    }

    pub fn value(&self, snapshot: &PerformanceSnapshot) -> f64 {
        match self {
            Self::Pnl => snapshot.pnl,
            Self::WinRate => snapshot.win_rate,
            Self::Drawdown => snapshot.drawdown,
            Self::Sharpe => snapshot.sharpe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMetric {
    Exposure,
    Var,
    Leverage,
}

impl RiskMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exposure => "exposure",
            Self::Var => "var",
            Self::Leverage => "leverage",
        }
    }

    pub fn value(&self, snapshot: &RiskSnapshot) -> f64 {
        match self {
            Self::Exposure => snapshot.exposure,
            Self::Var => snapshot.var,
            Self::Leverage => snapshot.leverage,
        }
    }
}

/// Threshold on signal confidence, optionally restricted to one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalThreshold {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<SignalAction>,
    #[serde(flatten)]
    pub threshold: Threshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold<M> {
    pub metric: M,
    #[serde(flatten)]
    pub threshold: Threshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyWatch {
    pub strategy: String,
    #[serde(default)]
    pub signals: Vec<SignalThreshold>,
    #[serde(default)]
    pub performance: Vec<MetricThreshold<PerformanceMetric>>,
    #[serde(default)]
    pub risk: Vec<MetricThreshold<RiskMetric>>,
}

impl StrategyWatch {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            signals: Vec::new(),
            performance: Vec::new(),
            risk: Vec::new(),
        }
    }

    pub fn signal(mut self, action: Option<SignalAction>, threshold: Threshold) -> Self {
        self.signals.push(SignalThreshold { action, threshold });
        self
    }

    pub fn performance(mut self, metric: PerformanceMetric, threshold: Threshold) -> Self {
        self.performance.push(MetricThreshold { metric, threshold });
        self
    }

    pub fn risk(mut self, metric: RiskMetric, threshold: Threshold) -> Self {
        self.risk.push(MetricThreshold { metric, threshold });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyMonitorConfig {
    #[serde(with = "humantime_serde")]
    pub signal_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub risk_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub performance_interval: Duration,
    pub source: String,
}

impl Default for StrategyMonitorConfig {
    fn default() -> Self {
        Self {
            signal_interval: Duration::from_secs(1),
            risk_interval: Duration::from_secs(2),
            performance_interval: Duration::from_secs(5),
            source: "strategy-monitor".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct StrategyState {
    pending: VecDeque<Signal>,
    last_confidence: Option<f64>,
    performance: Reading<PerformanceSnapshot>,
    risk: Reading<RiskSnapshot>,
}

#[derive(Debug)]
struct WatchState {
    watch: StrategyWatch,
    signals: Vec<Trigger>,
    performance: Vec<Trigger>,
    risk: Vec<Trigger>,
}

impl WatchState {
    fn new(watch: StrategyWatch) -> Self {
        Self {
            signals: vec![Trigger::default(); watch.signals.len()],
            performance: vec![Trigger::default(); watch.performance.len()],
            risk: vec![Trigger::default(); watch.risk.len()],
            watch,
        }
    }
}

#[derive(Default)]
struct Inner {
    strategies: HashMap<String, StrategyState>,
    watches: HashMap<String, WatchState>,
}

pub struct StrategySignalMonitor {
    config: StrategyMonitorConfig,
    inner: Mutex<Inner>,
    tasks: Mutex<Option<PeriodicTasks>>,
}

impl Default for StrategySignalMonitor {
    fn default() -> Self {
        Self::new(StrategyMonitorConfig::default())
    }
}

impl StrategySignalMonitor {
    pub fn new(config: StrategyMonitorConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            tasks: Mutex::new(None),
        }
    }

    pub fn add_watch(&self, watch: StrategyWatch) {
        info!(
            strategy = %watch.strategy,
            signals = watch.signals.len(),
            performance = watch.performance.len(),
            risk = watch.risk.len(),
            "Strategy watch added"
        );
        self.inner
            .lock()
            .watches
            .insert(watch.strategy.clone(), WatchState::new(watch));
    }

    pub fn remove_watch(&self, strategy: &str) -> Option<StrategyWatch> {
        self.inner.lock().watches.remove(strategy).map(|s| s.watch)
    }

    pub fn watches(&self) -> Vec<StrategyWatch> {
        let mut watches: Vec<StrategyWatch> = self
            .inner
            .lock()
            .watches
            .values()
            .map(|s| s.watch.clone())
            .collect();
        watches.sort_by(|a, b| a.strategy.cmp(&b.strategy));
        watches
    }

    /// Re-arm every threshold of a strategy's watch
    pub fn reset(&self, strategy: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(state) = inner.watches.get_mut(strategy) else {
            return false;
        };
        state
            .signals
            .iter_mut()
            .chain(state.performance.iter_mut())
            .chain(state.risk.iter_mut())
            .for_each(Trigger::reset);
        true
    }

    // ---------------------------------------------------------------------
    // Inputs
    // ---------------------------------------------------------------------

    /// Queue a signal for the next signal check; the oldest is dropped when full
    pub fn record_signal(&self, strategy: &str, signal: Signal) {
        let mut inner = self.inner.lock();
        let pending = &mut inner.strategies.entry(strategy.to_string()).or_default().pending;
        if pending.len() >= MAX_PENDING_SIGNALS {
            pending.pop_front();
            warn!(strategy, "Pending signal buffer full, dropping oldest");
        }
        pending.push_back(signal);
    }

    pub fn update_performance(&self, strategy: &str, snapshot: PerformanceSnapshot) {
        self.inner
            .lock()
            .strategies
            .entry(strategy.to_string())
            .or_default()
            .performance
            .update(snapshot, Utc::now());
    }

    pub fn update_risk(&self, strategy: &str, snapshot: RiskSnapshot) {
        self.inner
            .lock()
            .strategies
            .entry(strategy.to_string())
            .or_default()
            .risk
            .update(snapshot, Utc::now());
    }

    // ---------------------------------------------------------------------
    // Checks
    // ---------------------------------------------------------------------

    /// Drain pending signals and evaluate confidence thresholds
    ///
    /// Signals of unwatched strategies are discarded.
    pub fn check_signals(&self, sink: &dyn EventSink) -> usize {
        let events = {
            let mut inner = self.inner.lock();
            let Inner { strategies, watches } = &mut *inner;
            let mut events = Vec::new();
            for (name, strategy) in strategies.iter_mut() {
                let signals: Vec<Signal> = strategy.pending.drain(..).collect();
                let Some(state) = watches.get_mut(name) else { continue };

                for signal in signals {
                    let previous = strategy.last_confidence.replace(signal.confidence);
                    for (st, trigger) in state.watch.signals.iter().zip(state.signals.iter_mut()) {
                        if st.action.is_some_and(|a| a != signal.action) {
                            continue;
                        }
                        if trigger.check(&st.threshold, previous, signal.confidence) {
                            events.push(
                                self.event(STRATEGY_SIGNAL, name, &st.threshold)
                                    .with_message(format!(
                                        "{} {} {} @ {} (confidence {})",
                                        name, signal.action, signal.symbol, signal.price, signal.confidence
                                    ))
                                    .with_field("symbol", signal.symbol.as_str())
                                    .with_field("action", signal.action.as_str())
                                    .with_field("confidence", signal.confidence)
                                    .with_field("price", signal.price)
                                    .with_field("previous", previous)
                                    .with_field("watch_action", watch_action(st.action)),
                            );
                        }
                    }
                }
            }
            events
        };
        emit(sink, events)
    }

    pub fn check_performance(&self, sink: &dyn EventSink) -> usize {
        let events = {
            let mut inner = self.inner.lock();
            let Inner { strategies, watches } = &mut *inner;
            let mut events = Vec::new();
            for (name, state) in watches.iter_mut() {
                let Some(strategy) = strategies.get_mut(name) else { continue };
                let Some((previous, current)) = strategy.performance.advance() else { continue };
                for (mt, trigger) in state.watch.performance.iter().zip(state.performance.iter_mut()) {
                    let value = mt.metric.value(&current);
                    let prev = previous.map(|p| mt.metric.value(&p));
                    if trigger.check(&mt.threshold, prev, value) {
                        events.push(self.metric_event(
                            STRATEGY_PERFORMANCE,
                            name,
                            &mt.threshold,
                            mt.metric.as_str(),
                            value,
                            prev,
                        ));
                    }
                }
            }
            events
        };
        emit(sink, events)
    }

    pub fn check_risk(&self, sink: &dyn EventSink) -> usize {
        let events = {
            let mut inner = self.inner.lock();
            let Inner { strategies, watches } = &mut *inner;
            let mut events = Vec::new();
            for (name, state) in watches.iter_mut() {
                let Some(strategy) = strategies.get_mut(name) else { continue };
                let Some((previous, current)) = strategy.risk.advance() else { continue };
                for (mt, trigger) in state.watch.risk.iter().zip(state.risk.iter_mut()) {
                    let value = mt.metric.value(&current);
                    let prev = previous.map(|p| mt.metric.value(&p));
                    if trigger.check(&mt.threshold, prev, value) {
                        events.push(self.metric_event(
                            STRATEGY_RISK,
                            name,
                            &mt.threshold,
                            mt.metric.as_str(),
                            value,
                            prev,
                        ));
                    }
                }
            }
            events
        };
        emit(sink, events)
    }

    fn event(&self, event_type: &str, strategy: &str, threshold: &Threshold) -> AlertEvent {
        AlertEvent::new(event_type, self.config.source.as_str())
            .with_severity(threshold.severity)
            .with_field("strategy", strategy)
            .with_field("threshold", threshold.value)
            .with_field("operator", threshold.operator.as_str())
    }

    fn metric_event(
        &self,
        event_type: &str,
        strategy: &str,
        threshold: &Threshold,
        metric: &str,
        value: f64,
        previous: Option<f64>,
    ) -> AlertEvent {
        self.event(event_type, strategy, threshold)
            .with_message(format!(
                "{}: {} {} {} {}",
                strategy, metric, value, threshold.operator, threshold.value
            ))
            .with_field("metric", metric)
            .with_field("value", value)
            .with_field("previous", previous)
    }

    /// One engine rule per watched threshold
    ///
    /// Signal rules match on `watch_action` rather than `action`, so an
    /// any-action watch and a buy-only watch on the same threshold each
    /// alert only for their own events.
    pub fn engine_rules(&self, channels: &[String]) -> Vec<AlertRule> {
        let mut rules = Vec::new();
        for watch in self.watches() {
            let mut push = |event_type: &str, threshold: &Threshold, extra: Option<AlertCondition>| {
                let mut rule = AlertRule::new(
                    format!("{} {} {} {}", watch.strategy, event_type, threshold.operator, threshold.value),
                    event_type,
                    threshold.severity,
                )
                .with_condition(AlertCondition::eq("strategy", watch.strategy.as_str()))
                .with_condition(AlertCondition::eq("operator", threshold.operator.as_str()))
                .with_condition(AlertCondition::eq("threshold", threshold.value))
                .with_template(event_type)
                .with_message(format!("{} threshold reached", event_type))
                .with_cooldown(Duration::ZERO)
                .with_channels(channels.iter().cloned());
                if let Some(condition) = extra {
                    rule = rule.with_condition(condition);
                }
                rules.push(rule);
            };

            for st in &watch.signals {
                push(
                    STRATEGY_SIGNAL,
                    &st.threshold,
                    Some(AlertCondition::eq("watch_action", watch_action(st.action))),
                );
            }
            for mt in &watch.performance {
                push(
                    STRATEGY_PERFORMANCE,
                    &mt.threshold,
                    Some(AlertCondition::eq("metric", mt.metric.as_str())),
                );
            }
            for mt in &watch.risk {
                push(
                    STRATEGY_RISK,
                    &mt.threshold,
                    Some(AlertCondition::eq("metric", mt.metric.as_str())),
                );
            }
        }
        rules
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    pub fn start(self: &Arc<Self>, sink: Arc<dyn EventSink>) -> Result<()> {
        let mut slot = self.tasks.lock();
        if slot.is_some() {
            return Err(already_running());
        }
        let mut tasks = PeriodicTasks::new()?;

        let checks: [(&'static str, Duration, fn(&Self, &dyn EventSink) -> usize); 3] = [
            ("strategy-signals", self.config.signal_interval, Self::check_signals),
            ("strategy-risk", self.config.risk_interval, Self::check_risk),
            ("strategy-performance", self.config.performance_interval, Self::check_performance),
        ];
        for (name, period, check) in checks {
            let monitor = Arc::clone(self);
            let sink = Arc::clone(&sink);
            tasks.spawn(name, period, move || {
                check(monitor.as_ref(), sink.as_ref());
            });
        }

        *slot = Some(tasks);
        info!(watches = self.inner.lock().watches.len(), "Strategy monitor started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    pub async fn stop(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
            info!("Strategy monitor stopped");
        }
    }
}

fn watch_action(action: Option<SignalAction>) -> &'static str {
    action.map_or(ANY_ACTION, |a| a.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::rules::matches_all;
    use herald_core::testing::RecordingSink;
    use herald_core::Value;

    fn perf(drawdown: f64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            drawdown,
            ..Default::default()
        }
    }

    #[test]
    fn test_signal_action_filter() {
        let m = StrategySignalMonitor::default();
        let sink = RecordingSink::new();
        m.add_watch(StrategyWatch::new("momo").signal(Some(SignalAction::Buy), Threshold::above(0.8)));

        m.record_signal("momo", Signal::new("BTC", SignalAction::Sell, 0.95, 100.0));
        assert_eq!(m.check_signals(&sink), 0);

        m.record_signal("momo", Signal::new("BTC", SignalAction::Buy, 0.9, 101.0));
        assert_eq!(m.check_signals(&sink), 1);

        let event = &sink.events()[0];
        assert_eq!(event.event_type, STRATEGY_SIGNAL);
        assert_eq!(event.data["action"], Value::from("buy"));
        assert_eq!(event.data["strategy"], Value::from("momo"));
    }

    #[test]
    fn test_pending_signals_drained_once() {
        let m = StrategySignalMonitor::default();
        let sink = RecordingSink::new();
        m.add_watch(StrategyWatch::new("s").signal(None, Threshold::above(0.5)));

        m.record_signal("s", Signal::new("ETH", SignalAction::Buy, 0.9, 1.0));
        m.record_signal("s", Signal::new("ETH", SignalAction::Buy, 0.1, 1.0));
        m.record_signal("s", Signal::new("ETH", SignalAction::Buy, 0.7, 1.0));
        assert_eq!(m.check_signals(&sink), 2);
        assert_eq!(m.check_signals(&sink), 0);
    }

    #[test]
    fn test_performance_crosses_above() {
        let m = StrategySignalMonitor::default();
        let sink = RecordingSink::new();
        m.add_watch(
            StrategyWatch::new("mm").performance(PerformanceMetric::Drawdown, Threshold::crosses_above(0.1)),
        );

        m.update_performance("mm", perf(0.05));
        assert_eq!(m.check_performance(&sink), 0);
        m.update_performance("mm", perf(0.15));
        assert_eq!(m.check_performance(&sink), 1);
        m.update_performance("mm", perf(0.2));
        assert_eq!(m.check_performance(&sink), 0);

        let event = &sink.events()[0];
        assert_eq!(event.data["metric"], Value::from("drawdown"));
        assert_eq!(event.data["previous"], Value::from(0.05));
    }

    #[test]
    fn test_risk_threshold_and_reset() {
        let m = StrategySignalMonitor::default();
        let sink = RecordingSink::new();
        m.add_watch(StrategyWatch::new("mm").risk(RiskMetric::Leverage, Threshold::above(3.0)));

        m.update_risk("mm", RiskSnapshot { leverage: 5.0, ..Default::default() });
        assert_eq!(m.check_risk(&sink), 1);
        assert_eq!(m.check_risk(&sink), 0);
        assert!(m.reset("mm"));
        assert_eq!(m.check_risk(&sink), 1);
    }

    #[test]
    fn test_unwatched_strategy_ignored() {
        let m = StrategySignalMonitor::default();
        let sink = RecordingSink::new();
        m.record_signal("ghost", Signal::new("X", SignalAction::Hold, 1.0, 1.0));
        m.update_risk("ghost", RiskSnapshot::default());
        assert_eq!(m.check_signals(&sink) + m.check_risk(&sink), 0);
    }

    #[test]
    fn test_watch_deserializes_flattened_thresholds() {
        let watch: StrategyWatch = serde_json::from_str(
            r#"{
                "strategy": "mm",
                "signals": [{"action": "buy", "operator": "above", "value": 0.8}],
                "risk": [{"metric": "var", "operator": "above", "value": 1000, "severity": "critical"}]
            }"#,
        )
        .unwrap();
        assert_eq!(watch.signals[0].action, Some(SignalAction::Buy));
        assert_eq!(watch.risk[0].metric, RiskMetric::Var);
        assert_eq!(watch.risk[0].threshold.severity, herald_core::AlertSeverity::Critical);
    }

    #[test]
    fn test_engine_rules_cover_every_threshold() {
        let m = StrategySignalMonitor::default();
        m.add_watch(
            StrategyWatch::new("mm")
                .signal(None, Threshold::above(0.5))
                .performance(PerformanceMetric::Pnl, Threshold::below(-100.0))
                .risk(RiskMetric::Exposure, Threshold::above(1e6)),
        );
        let rules = m.engine_rules(&[]);
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().all(|r| r.validate().is_ok()));
    }

    /// Test: overlapping signal watches each match only their own events
    #[test]
    fn test_signal_rules_do_not_overlap() {
        let m = StrategySignalMonitor::default();
        let sink = RecordingSink::new();
        m.add_watch(
            StrategyWatch::new("s")
                .signal(None, Threshold::above(0.5))
                .signal(Some(SignalAction::Buy), Threshold::above(0.5)),
        );
        let rules = m.engine_rules(&[]);

        m.record_signal("s", Signal::new("ETH", SignalAction::Buy, 0.9, 1.0));
        assert_eq!(m.check_signals(&sink), 2);

        for event in sink.events() {
            let fields = event.evaluation_fields();
            let matching = rules
                .iter()
                .filter(|r| matches_all(&r.conditions, &fields))
                .count();
            assert_eq!(matching, 1, "event {:?} matched {} rules", event.data, matching);
        }
        assert_eq!(sink.events()[0].data["watch_action"], Value::from(ANY_ACTION));
    }
}
