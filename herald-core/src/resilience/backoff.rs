//! Exponential backoff for delivery retries
//!
//! Network channels (HTTP, SMTP) retry transient failures with exponential
//! backoff plus jitter. [`retry`] drives an async operation against a
//! [`BackoffConfig`], stopping early on errors the caller marks permanent.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Configuration for exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Retries after the first attempt (None = unlimited)
    pub max_retries: Option<usize>,
    /// Randomization applied to each delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::delivery()
    }
}

impl BackoffConfig {
    /// Three retries, 250ms doubling up to 5s
    pub fn delivery() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_retries: Some(3),
            jitter_factor: 0.2,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: Some(0),
            ..Self::delivery()
        }
    }

    /// Short delays for tests
    pub fn aggressive() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 1.5,
            max_retries: Some(5),
            jitter_factor: 0.1,
        }
    }
}

/// Exponential backoff state machine
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_attempt: usize,
    current_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            current_attempt: 0,
            config,
        }
    }

    /// Next delay, advancing the state. `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        let delay = self.delay_with_jitter();
        self.current_attempt += 1;
        self.current_delay = std::cmp::min(
            Duration::from_secs_f64(self.current_delay.as_secs_f64() * self.config.multiplier),
            self.config.max_delay,
        );
        Some(delay)
    }

    fn delay_with_jitter(&self) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return self.current_delay;
        }

        let jitter = rand::thread_rng().gen::<f64>() * self.config.jitter_factor;
        let multiplier = 1.0 + (jitter - self.config.jitter_factor / 2.0);
        Duration::from_secs_f64(self.current_delay.as_secs_f64() * multiplier)
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.current_delay = self.config.initial_delay;
    }

    pub fn attempt_number(&self) -> usize {
        self.current_attempt
    }

    pub fn can_retry(&self) -> bool {
        match self.config.max_retries {
            Some(max) => self.current_attempt < max,
            None => true,
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `op` until it succeeds, `retryable` rejects the error, or retries run out
pub async fn retry<T, E, F, Fut>(
    config: &BackoffConfig,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = ExponentialBackoff::with_config(config.clone());
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) => match backoff.next_delay() {
                Some(delay) => {
                    debug!(
                        attempt = backoff.attempt_number(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_jitter(max_retries: usize) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
            max_retries: Some(max_retries),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_backoff_exponential_growth_capped() {
        let mut backoff = ExponentialBackoff::with_config(no_jitter(5));
        let delays: Vec<Duration> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_millis(4),
                Duration::from_millis(4),
                Duration::from_millis(4),
            ]
        );
        assert!(!backoff.can_retry());
    }

    #[test]
    fn test_none_preset_never_retries() {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig::none());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_reset() {
        let mut backoff = ExponentialBackoff::with_config(no_jitter(2));
        backoff.next_delay();
        backoff.next_delay();
        assert!(!backoff.can_retry());
        backoff.reset();
        assert_eq!(backoff.attempt_number(), 0);
        assert!(backoff.can_retry());
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(100),
            jitter_factor: 0.2,
            ..BackoffConfig::delivery()
        };
        for _ in 0..50 {
            let mut backoff = ExponentialBackoff::with_config(config.clone());
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= Duration::from_millis(90) && delay <= Duration::from_millis(110));
        }
    }

    #[test]
    fn test_config_deserializes_humantime() {
        let config: BackoffConfig =
            serde_json::from_str(r#"{"initialDelay": "100ms", "maxRetries": 2}"#).unwrap();
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_retries, Some(2));
        assert_eq!(config.max_delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, String> = retry(&no_jitter(5), |_| true, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(format!("attempt {n}"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = retry(&no_jitter(5), |e: &String| e != "fatal", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("fatal".to_string())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = retry(&no_jitter(2), |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
