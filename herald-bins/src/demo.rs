//! Synthetic feed for trying the engine without real data
//!
//! A random walk on two exchanges drives the market monitor; a toy
//! strategy emits signals and performance/risk snapshots. Rules generated
//! by the monitors deliver to every configured channel.

use anyhow::Result;
use herald_core::{AlertEngine, AlertSeverity, EventSink};
use herald_monitors::{
    MarketEventMonitor, MarketWatch, PerformanceMetric, PerformanceSnapshot, RiskMetric, RiskSnapshot, Signal,
    SignalAction, StrategySignalMonitor, StrategyWatch, Threshold,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const SYMBOL: &str = "BTC-USD";
pub const EXCHANGES: [&str; 2] = ["coinbase", "kraken"];
pub const STRATEGY: &str = "demo-maker";
pub const START_PRICE: f64 = 100_000.0;

const TICK: Duration = Duration::from_millis(250);

/// Random-walk prices for each exchange
pub struct RandomWalk {
    rng: StdRng,
    prices: Vec<f64>,
    step_pct: f64,
}

impl RandomWalk {
    pub fn new(start: f64, venues: usize, step_pct: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            prices: vec![start; venues],
            step_pct,
        }
    }

    /// Advance every venue one step; venues drift independently around a shared move
    pub fn step(&mut self) -> &[f64] {
        let common = self.rng.gen_range(-self.step_pct..self.step_pct);
        for price in &mut self.prices {
            let own = self.rng.gen_range(-self.step_pct..self.step_pct) / 4.0;
            *price = (*price * (1.0 + (common + own) / 100.0)).max(0.01);
        }
        &self.prices
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

pub fn market_watches() -> Vec<MarketWatch> {
    EXCHANGES
        .iter()
        .map(|exchange| {
            MarketWatch::new(SYMBOL, *exchange)
                .price(Threshold::crosses_above(START_PRICE * 1.01))
                .price(Threshold::crosses_below(START_PRICE * 0.99).with_severity(AlertSeverity::Error))
                .volume(Threshold::above(900.0).with_severity(AlertSeverity::Info))
                .volatility(Threshold::above(0.5))
                .arbitrage(Threshold::above(0.2).with_severity(AlertSeverity::Info))
        })
        .collect()
}

pub fn strategy_watch() -> StrategyWatch {
    StrategyWatch::new(STRATEGY)
        .signal(Some(SignalAction::Buy), Threshold::above(0.9).with_severity(AlertSeverity::Info))
        .performance(PerformanceMetric::Drawdown, Threshold::crosses_above(0.05))
        .risk(RiskMetric::Leverage, Threshold::above(4.0).with_severity(AlertSeverity::Critical))
}

/// Run the feed until `cancel` fires
pub async fn run(engine: Arc<AlertEngine>, channels: Vec<String>, cancel: CancellationToken) -> Result<()> {
    let market = Arc::new(MarketEventMonitor::default());
    for watch in market_watches() {
        market.add_watch(watch);
    }
    let strategy = Arc::new(StrategySignalMonitor::default());
    strategy.add_watch(strategy_watch());

    let mut rules = market.engine_rules(&channels);
    rules.extend(strategy.engine_rules(&channels));
    let count = rules.len();
    for rule in rules {
        engine.add_rule(rule)?;
    }
    info!(rules = count, channels = ?channels, "Demo rules installed");

    let sink: Arc<dyn EventSink> = engine;
    market.start(Arc::clone(&sink))?;
    strategy.start(sink)?;

    let mut walk = RandomWalk::new(START_PRICE, EXCHANGES.len(), 0.3, None);
    let mut peak = 0.0_f64;
    let mut pnl = 0.0_f64;
    let mut ticker = tokio::time::interval(TICK);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let prices = walk.step().to_vec();
        for (exchange, price) in EXCHANGES.iter().zip(&prices) {
            market.update_price(SYMBOL, exchange, *price);
            let volume = walk.rng().gen_range(100.0..1_000.0);
            market.update_volume(SYMBOL, exchange, volume);
        }

        let rng = walk.rng();
        pnl += rng.gen_range(-50.0..55.0);
        peak = peak.max(pnl);
        let drawdown = if peak > 0.0 { (peak - pnl) / peak } else { 0.0 };
        strategy.update_performance(
            STRATEGY,
            PerformanceSnapshot {
                pnl,
                win_rate: rng.gen_range(0.4..0.6),
                drawdown,
                sharpe: rng.gen_range(0.5..2.5),
            },
        );
        strategy.update_risk(
            STRATEGY,
            RiskSnapshot {
                exposure: prices[0] * rng.gen_range(0.0..2.0),
                var: rng.gen_range(100.0..1_000.0),
                leverage: rng.gen_range(1.0..5.0),
            },
        );
        let action = match rng.gen_range(0..4) {
            0 => SignalAction::Buy,
            1 => SignalAction::Sell,
            2 => SignalAction::Hold,
            _ => SignalAction::Close,
        };
        let confidence = rng.gen_range(0.0..1.0);
        strategy.record_signal(STRATEGY, Signal::new(SYMBOL, action, confidence, prices[0]));
    }

    market.stop().await;
    strategy.stop().await;
    info!("Demo feed stopped");
    Ok(())
}
