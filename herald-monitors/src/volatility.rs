//! Rolling volatility over a window of recent prices
//!
//! Volatility is the population standard deviation of simple returns
//! between consecutive samples, in percent. No annualisation is applied.

use std::collections::VecDeque;

/// Default number of price samples kept per market
pub const DEFAULT_WINDOW: usize = 20;

/// Rolling volatility estimator with a bounded sample window
#[derive(Debug, Clone)]
pub struct RollingVolatility {
    /// Most recent prices, oldest first
    prices: VecDeque<f64>,
    window: usize,
    /// Cached result, invalidated by every new sample
    cached: Option<f64>,
}

impl Default for RollingVolatility {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl RollingVolatility {
    /// `window` is clamped to at least 2 samples (one return)
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            prices: VecDeque::with_capacity(window),
            window,
            cached: None,
        }
    }

    /// Add a new price observation, evicting the oldest when full
    pub fn add_price(&mut self, price: f64) {
        if !price.is_finite() {
            return;
        }
        if self.prices.len() == self.window {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
        self.cached = None;
    }

    /// Standard deviation of returns in percent; `None` until two samples exist
    pub fn volatility(&mut self) -> Option<f64> {
        if let Some(v) = self.cached {
            return Some(v);
        }

        let returns: Vec<f64> = self
            .prices
            .iter()
            .zip(self.prices.iter().skip(1))
            .filter(|(p1, _)| **p1 > 0.0)
            .map(|(p1, p2)| (p2 - p1) / p1 * 100.0)
            .collect();

        if returns.is_empty() {
            return None;
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        self.cached = Some(std_dev);
        Some(std_dev)
    }

    /// Check if enough data for meaningful estimate
    pub fn is_ready(&self) -> bool {
        self.prices.len() >= self.window / 2
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Reset the estimator
    pub fn reset(&mut self) {
        self.prices.clear();
        self.cached = None;
    }
}
