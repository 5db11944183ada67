//! Market event monitor
//!
//! Tracks price and volume per `symbol@exchange`, keeps a rolling
//! volatility window per market, and compares prices of the same symbol
//! across exchanges. Periodic checks turn threshold transitions into
//! `price_alert`, `volume_alert`, `volatility_alert` and `arbitrage_alert`
//! events for an [`EventSink`].

use crate::periodic::{already_running, PeriodicTasks};
use crate::threshold::{Reading, Threshold, Trigger};
use crate::volatility::{RollingVolatility, DEFAULT_WINDOW};
use chrono::Utc;
use herald_core::rules::AlertCondition;
use herald_core::{AlertEvent, AlertRule, EventSink, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PRICE_ALERT: &str = "price_alert";
pub const VOLUME_ALERT: &str = "volume_alert";
pub const VOLATILITY_ALERT: &str = "volatility_alert";
pub const ARBITRAGE_ALERT: &str = "arbitrage_alert";

/// Watch / market key
pub fn market_key(symbol: &str, exchange: &str) -> String {
    format!("{}@{}", symbol, exchange)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketMonitorConfig {
    #[serde(with = "humantime_serde")]
    pub price_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub arbitrage_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub volume_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub volatility_interval: Duration,
    /// Price samples per volatility window
    pub volatility_window: usize,
    /// `source` of emitted events
    pub source: String,
}

impl Default for MarketMonitorConfig {
    fn default() -> Self {
        Self {
            price_interval: Duration::from_secs(1),
            arbitrage_interval: Duration::from_secs(1),
            volume_interval: Duration::from_secs(5),
            volatility_interval: Duration::from_secs(10),
            volatility_window: DEFAULT_WINDOW,
            source: "market-monitor".to_string(),
        }
    }
}

/// Thresholds for one `symbol@exchange`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketWatch {
    pub symbol: String,
    pub exchange: String,
    #[serde(default)]
    pub price: Vec<Threshold>,
    #[serde(default)]
    pub volume: Vec<Threshold>,
    /// Against rolling volatility in percent
    #[serde(default)]
    pub volatility: Vec<Threshold>,
    /// Against the cross-exchange spread in percent of this market's price
    #[serde(default)]
    pub arbitrage: Vec<Threshold>,
}

impl MarketWatch {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            price: Vec::new(),
            volume: Vec::new(),
            volatility: Vec::new(),
            arbitrage: Vec::new(),
        }
    }

    pub fn price(mut self, threshold: Threshold) -> Self {
        self.price.push(threshold);
        self
    }

    pub fn volume(mut self, threshold: Threshold) -> Self {
        self.volume.push(threshold);
        self
    }

    pub fn volatility(mut self, threshold: Threshold) -> Self {
        self.volatility.push(threshold);
        self
    }

    pub fn arbitrage(mut self, threshold: Threshold) -> Self {
        self.arbitrage.push(threshold);
        self
    }

    pub fn key(&self) -> String {
        market_key(&self.symbol, &self.exchange)
    }
}

/// Observed state of one market, watched or not
#[derive(Debug)]
struct MarketState {
    symbol: String,
    exchange: String,
    price: Reading<f64>,
    volume: Reading<f64>,
    prices: RollingVolatility,
}

impl MarketState {
    fn new(symbol: &str, exchange: &str, window: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            price: Reading::default(),
            volume: Reading::default(),
            prices: RollingVolatility::new(window),
        }
    }
}

#[derive(Debug)]
struct WatchState {
    watch: MarketWatch,
    price: Vec<Trigger>,
    volume: Vec<Trigger>,
    volatility: Vec<Trigger>,
    volatility_checked: Option<f64>,
    /// Keyed by (threshold index, other exchange)
    arbitrage: HashMap<(usize, String), Trigger>,
    spread_checked: HashMap<String, f64>,
}

impl WatchState {
    fn new(watch: MarketWatch) -> Self {
        Self {
            price: vec![Trigger::default(); watch.price.len()],
            volume: vec![Trigger::default(); watch.volume.len()],
            volatility: vec![Trigger::default(); watch.volatility.len()],
            volatility_checked: None,
            arbitrage: HashMap::new(),
            spread_checked: HashMap::new(),
            watch,
        }
    }

    fn reset(&mut self) {
        self.price.iter_mut().for_each(Trigger::reset);
        self.volume.iter_mut().for_each(Trigger::reset);
        self.volatility.iter_mut().for_each(Trigger::reset);
        self.arbitrage.clear();
    }
}

#[derive(Default)]
struct Inner {
    markets: HashMap<String, MarketState>,
    watches: HashMap<String, WatchState>,
}

pub struct MarketEventMonitor {
    config: MarketMonitorConfig,
    inner: Mutex<Inner>,
    tasks: Mutex<Option<PeriodicTasks>>,
}

impl MarketEventMonitor {
    pub fn new(config: MarketMonitorConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            tasks: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MarketMonitorConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Watches
    // ---------------------------------------------------------------------

    /// Add or replace the watch for `symbol@exchange`; trigger state starts armed
    pub fn add_watch(&self, watch: MarketWatch) {
        let key = watch.key();
        info!(
            market = %key,
            price = watch.price.len(),
            volume = watch.volume.len(),
            volatility = watch.volatility.len(),
            arbitrage = watch.arbitrage.len(),
            "Market watch added"
        );
        self.inner.lock().watches.insert(key, WatchState::new(watch));
    }

    pub fn remove_watch(&self, symbol: &str, exchange: &str) -> Option<MarketWatch> {
        self.inner
            .lock()
            .watches
            .remove(&market_key(symbol, exchange))
            .map(|state| state.watch)
    }

    pub fn watches(&self) -> Vec<MarketWatch> {
        let mut watches: Vec<MarketWatch> = self
            .inner
            .lock()
            .watches
            .values()
            .map(|state| state.watch.clone())
            .collect();
        watches.sort_by_key(MarketWatch::key);
        watches
    }

    /// Re-arm every threshold of a watch; false if no such watch
    pub fn reset(&self, symbol: &str, exchange: &str) -> bool {
        match self.inner.lock().watches.get_mut(&market_key(symbol, exchange)) {
            Some(state) => {
                state.reset();
                true
            }
            None => false,
        }
    }

    // ---------------------------------------------------------------------
    // Inputs
    // ---------------------------------------------------------------------

    pub fn update_price(&self, symbol: &str, exchange: &str, price: f64) {
        if !price.is_finite() {
            warn!(symbol, exchange, price, "Ignoring non-finite price");
            return;
        }
        let window = self.config.volatility_window;
        let mut inner = self.inner.lock();
        let market = inner
            .markets
            .entry(market_key(symbol, exchange))
            .or_insert_with(|| MarketState::new(symbol, exchange, window));
        market.price.update(price, Utc::now());
        market.prices.add_price(price);
    }

    pub fn update_volume(&self, symbol: &str, exchange: &str, volume: f64) {
        if !volume.is_finite() {
            warn!(symbol, exchange, volume, "Ignoring non-finite volume");
            return;
        }
        let window = self.config.volatility_window;
        let mut inner = self.inner.lock();
        inner
            .markets
            .entry(market_key(symbol, exchange))
            .or_insert_with(|| MarketState::new(symbol, exchange, window))
            .volume
            .update(volume, Utc::now());
    }

    pub fn last_price(&self, symbol: &str, exchange: &str) -> Option<f64> {
        self.inner
            .lock()
            .markets
            .get(&market_key(symbol, exchange))
            .and_then(|m| m.price.current)
    }

    // ---------------------------------------------------------------------
    // Checks
    // ---------------------------------------------------------------------

    /// Evaluate price thresholds; returns the number of events accepted by `sink`
    pub fn check_prices(&self, sink: &dyn EventSink) -> usize {
        let events = {
            let mut inner = self.inner.lock();
            let Inner { markets, watches } = &mut *inner;
            let mut events = Vec::new();
            for (key, state) in watches.iter_mut() {
                let Some(market) = markets.get_mut(key) else { continue };
                let Some((previous, current)) = market.price.advance() else { continue };
                for (threshold, trigger) in state.watch.price.iter().zip(state.price.iter_mut()) {
                    if trigger.check(threshold, previous, current) {
                        events.push(
                            self.event(PRICE_ALERT, &state.watch, threshold, "price", current, previous),
                        );
                    }
                }
            }
            events
        };
        emit(sink, events)
    }

    pub fn check_volumes(&self, sink: &dyn EventSink) -> usize {
        let events = {
            let mut inner = self.inner.lock();
            let Inner { markets, watches } = &mut *inner;
            let mut events = Vec::new();
            for (key, state) in watches.iter_mut() {
                let Some(market) = markets.get_mut(key) else { continue };
                let Some((previous, current)) = market.volume.advance() else { continue };
                for (threshold, trigger) in state.watch.volume.iter().zip(state.volume.iter_mut()) {
                    if trigger.check(threshold, previous, current) {
                        events.push(
                            self.event(VOLUME_ALERT, &state.watch, threshold, "volume", current, previous),
                        );
                    }
                }
            }
            events
        };
        emit(sink, events)
    }

    /// Evaluate volatility thresholds once the window is at least half full
    pub fn check_volatility(&self, sink: &dyn EventSink) -> usize {
        let events = {
            let mut inner = self.inner.lock();
            let Inner { markets, watches } = &mut *inner;
            let mut events = Vec::new();
            for (key, state) in watches.iter_mut() {
                if state.watch.volatility.is_empty() {
                    continue;
                }
                let Some(market) = markets.get_mut(key) else { continue };
                if !market.prices.is_ready() {
                    continue;
                }
                let Some(current) = market.prices.volatility() else { continue };
                let previous = state.volatility_checked.replace(current);
                for (threshold, trigger) in
                    state.watch.volatility.iter().zip(state.volatility.iter_mut())
                {
                    if trigger.check(threshold, previous, current) {
                        events.push(self.event(
                            VOLATILITY_ALERT,
                            &state.watch,
                            threshold,
                            "volatility",
                            current,
                            previous,
                        ));
                    }
                }
            }
            events
        };
        emit(sink, events)
    }

    /// Compare each watched market's price with the same symbol on every other exchange
    ///
    /// Spread is `|other - this| / this * 100`.
    pub fn check_arbitrage(&self, sink: &dyn EventSink) -> usize {
        let events = {
            let mut inner = self.inner.lock();
            let Inner { markets, watches } = &mut *inner;
            let mut events = Vec::new();
            for (key, state) in watches.iter_mut() {
                if state.watch.arbitrage.is_empty() {
                    continue;
                }
                let Some(price) = markets.get(key).and_then(|m| m.price.current) else { continue };
                if price <= 0.0 {
                    continue;
                }

                let mut others: Vec<(&str, f64)> = markets
                    .values()
                    .filter(|m| m.symbol == state.watch.symbol && m.exchange != state.watch.exchange)
                    .filter_map(|m| m.price.current.map(|p| (m.exchange.as_str(), p)))
                    .collect();
                others.sort_by(|a, b| a.0.cmp(b.0));

                for (other_exchange, other_price) in others {
                    let spread = (other_price - price).abs() / price * 100.0;
                    let previous = state
                        .spread_checked
                        .insert(other_exchange.to_string(), spread);

                    for (idx, threshold) in state.watch.arbitrage.iter().enumerate() {
                        let trigger = state
                            .arbitrage
                            .entry((idx, other_exchange.to_string()))
                            .or_default();
                        if trigger.check(threshold, previous, spread) {
                            let event = self
                                .event(ARBITRAGE_ALERT, &state.watch, threshold, "spread_pct", spread, previous)
                                .with_field("price", price)
                                .with_field("other_exchange", other_exchange)
                                .with_field("other_price", other_price);
                            events.push(event);
                        }
                    }
                }
            }
            events
        };
        emit(sink, events)
    }

    fn event(
        &self,
        event_type: &str,
        watch: &MarketWatch,
        threshold: &Threshold,
        metric: &str,
        current: f64,
        previous: Option<f64>,
    ) -> AlertEvent {
        AlertEvent::new(event_type, self.config.source.as_str())
            .with_severity(threshold.severity)
            .with_message(format!(
                "{} on {}: {} {} {} {}",
                watch.symbol, watch.exchange, metric, current, threshold.operator, threshold.value
            ))
            .with_field("symbol", watch.symbol.as_str())
            .with_field("exchange", watch.exchange.as_str())
            .with_field(metric, current)
            .with_field("previous", previous)
            .with_field("threshold", threshold.value)
            .with_field("operator", threshold.operator.as_str())
    }

    // ---------------------------------------------------------------------
    // Engine integration
    // ---------------------------------------------------------------------

    /// One engine rule per watched threshold, routing the monitor's events to `channels`
    ///
    /// Rules carry no cooldown: the monitor's own triggers already fire once
    /// per transition.
    pub fn engine_rules(&self, channels: &[String]) -> Vec<AlertRule> {
        let mut rules = Vec::new();
        for watch in self.watches() {
            let groups = [
                (PRICE_ALERT, &watch.price),
                (VOLUME_ALERT, &watch.volume),
                (VOLATILITY_ALERT, &watch.volatility),
                (ARBITRAGE_ALERT, &watch.arbitrage),
            ];
            for (event_type, thresholds) in groups {
                for threshold in thresholds {
                    let name = format!(
                        "{} {} {} {}",
                        watch.key(),
                        event_type,
                        threshold.operator,
                        threshold.value
                    );
                    rules.push(
                        AlertRule::new(name, event_type, threshold.severity)
                            .with_condition(AlertCondition::eq("symbol", watch.symbol.as_str()))
                            .with_condition(AlertCondition::eq("exchange", watch.exchange.as_str()))
                            .with_condition(AlertCondition::eq("operator", threshold.operator.as_str()))
                            .with_condition(AlertCondition::eq("threshold", threshold.value))
                            .with_template(event_type)
                            .with_message(format!("{} threshold reached", event_type))
                            .with_cooldown(Duration::ZERO)
                            .with_channels(channels.iter().cloned()),
                    );
                }
            }
        }
        rules
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Spawn the periodic checks, feeding `sink`
    pub fn start(self: &Arc<Self>, sink: Arc<dyn EventSink>) -> Result<()> {
        let mut slot = self.tasks.lock();
        if slot.is_some() {
            return Err(already_running());
        }
        let mut tasks = PeriodicTasks::new()?;

        let checks: [(&'static str, Duration, fn(&Self, &dyn EventSink) -> usize); 4] = [
            ("market-prices", self.config.price_interval, Self::check_prices),
            ("market-arbitrage", self.config.arbitrage_interval, Self::check_arbitrage),
            ("market-volumes", self.config.volume_interval, Self::check_volumes),
            ("market-volatility", self.config.volatility_interval, Self::check_volatility),
        ];
        for (name, period, check) in checks {
            let monitor = Arc::clone(self);
            let sink = Arc::clone(&sink);
            tasks.spawn(name, period, move || {
                check(monitor.as_ref(), sink.as_ref());
            });
        }

        *slot = Some(tasks);
        info!(watches = self.inner.lock().watches.len(), "Market monitor started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Cancel the periodic checks and wait for them; no-op when not running
    pub async fn stop(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
            info!("Market monitor stopped");
        }
    }
}

impl Default for MarketEventMonitor {
    fn default() -> Self {
        Self::new(MarketMonitorConfig::default())
    }
}

/// Hand events to the sink, logging rejections
pub(crate) fn emit(sink: &dyn EventSink, events: Vec<AlertEvent>) -> usize {
    let mut accepted = 0;
    for event in events {
        let event_type = event.event_type.clone();
        match sink.process_event(event) {
            Ok(()) => {
                accepted += 1;
                debug!(event_type = %event_type, "Monitor event emitted");
            }
            Err(e) => warn!(event_type = %event_type, error = %e, "Monitor event rejected"),
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use herald_core::testing::RecordingSink;
    use herald_core::Value;

    fn field<'a>(event: &'a AlertEvent, name: &str) -> Option<&'a Value> {
        event.data.get(name)
    }

    fn monitor() -> MarketEventMonitor {
        MarketEventMonitor::default()
    }

    #[test]
    fn test_price_above_fires_once_until_rearmed() {
        let m = monitor();
        let sink = RecordingSink::new();
        m.add_watch(MarketWatch::new("BTC", "binance").price(Threshold::above(100.0)));

        m.update_price("BTC", "binance", 101.0);
        assert_eq!(m.check_prices(&sink), 1);
        m.update_price("BTC", "binance", 102.0);
        assert_eq!(m.check_prices(&sink), 0);

        m.update_price("BTC", "binance", 99.0);
        assert_eq!(m.check_prices(&sink), 0);
        m.update_price("BTC", "binance", 105.0);
        assert_eq!(m.check_prices(&sink), 1);

        let events = sink.of_type(PRICE_ALERT);
        assert_eq!(events.len(), 2);
        assert_eq!(field(&events[1], "previous"), Some(&Value::Float(99.0)));
        assert_eq!(field(&events[1], "operator"), Some(&Value::from("above")));
    }

    #[test]
    fn test_crosses_above_uses_last_checked_value() {
        let m = monitor();
        let sink = RecordingSink::new();
        m.add_watch(MarketWatch::new("ETH", "kraken").price(Threshold::crosses_above(100.0)));

        m.update_price("ETH", "kraken", 95.0);
        assert_eq!(m.check_prices(&sink), 0);
        m.update_price("ETH", "kraken", 105.0);
        assert_eq!(m.check_prices(&sink), 1);
        m.update_price("ETH", "kraken", 110.0);
        assert_eq!(m.check_prices(&sink), 0);
    }

    #[test]
    fn test_reset_rearms_watch() {
        let m = monitor();
        let sink = RecordingSink::new();
        m.add_watch(MarketWatch::new("BTC", "binance").volume(Threshold::above(10.0)));
        m.update_volume("BTC", "binance", 50.0);
        assert_eq!(m.check_volumes(&sink), 1);
        assert_eq!(m.check_volumes(&sink), 0);
        assert!(m.reset("BTC", "binance"));
        assert_eq!(m.check_volumes(&sink), 1);
        assert!(!m.reset("BTC", "nowhere"));
    }

    #[test]
    fn test_arbitrage_spread() {
        let m = monitor();
        let sink = RecordingSink::new();
        m.add_watch(MarketWatch::new("BTC", "binance").arbitrage(Threshold::above(1.0)));

        m.update_price("BTC", "binance", 100.0);
        m.update_price("BTC", "kraken", 100.5);
        m.update_price("ETH", "kraken", 500.0);
        assert_eq!(m.check_arbitrage(&sink), 0);

        m.update_price("BTC", "kraken", 102.0);
        assert_eq!(m.check_arbitrage(&sink), 1);

        let events = sink.of_type(ARBITRAGE_ALERT);
        let event = &events[0];
        assert_eq!(field(event, "other_exchange"), Some(&Value::from("kraken")));
        assert_relative_eq!(field(event, "spread_pct").unwrap().as_f64().unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(field(event, "previous").unwrap().as_f64().unwrap(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_volatility_waits_for_window() {
        let m = MarketEventMonitor::new(MarketMonitorConfig {
            volatility_window: 4,
            ..Default::default()
        });
        let sink = RecordingSink::new();
        m.add_watch(MarketWatch::new("SOL", "dex").volatility(Threshold::above(5.0)));

        m.update_price("SOL", "dex", 100.0);
        assert_eq!(m.check_volatility(&sink), 0);
        m.update_price("SOL", "dex", 110.0);
        m.update_price("SOL", "dex", 99.0);
        assert_eq!(m.check_volatility(&sink), 1);
        let events = sink.of_type(VOLATILITY_ALERT);
        let event = &events[0];
        assert_relative_eq!(field(event, "volatility").unwrap().as_f64().unwrap(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unwatched_market_emits_nothing() {
        let m = monitor();
        let sink = RecordingSink::new();
        m.update_price("BTC", "binance", 1e9);
        assert_eq!(m.check_prices(&sink), 0);
        assert_eq!(m.last_price("BTC", "binance"), Some(1e9));
    }

    #[test]
    fn test_remove_and_list_watches() {
        let m = monitor();
        m.add_watch(MarketWatch::new("B", "x"));
        m.add_watch(MarketWatch::new("A", "x"));
        let keys: Vec<String> = m.watches().iter().map(MarketWatch::key).collect();
        assert_eq!(keys, vec!["A@x", "B@x"]);
        assert!(m.remove_watch("A", "x").is_some());
        assert!(m.remove_watch("A", "x").is_none());
    }

    #[test]
    fn test_engine_rules_match_emitted_events() {
        let m = monitor();
        let sink = RecordingSink::new();
        m.add_watch(MarketWatch::new("BTC", "binance").price(Threshold::above(100.0)));
        let rules = m.engine_rules(&["console".to_string()]);
        assert_eq!(rules.len(), 1);
        assert!(rules[0].validate().is_ok());

        m.update_price("BTC", "binance", 101.0);
        m.check_prices(&sink);
        let fields = sink.events()[0].evaluation_fields();
        assert!(herald_core::rules::matches_all(&rules[0].conditions, &fields));
    }
}
