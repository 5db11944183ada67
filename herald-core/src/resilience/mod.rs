//! Resilience patterns for delivery
//!
//! - Exponential backoff with jitter
//! - Async retry driver used by network channels

pub mod backoff;

pub use backoff::{retry, BackoffConfig, ExponentialBackoff};
