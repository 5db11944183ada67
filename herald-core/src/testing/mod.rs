//! Testing utilities for unit and integration tests
//!
//! Channel doubles, a recording event sink and builders for rules, events
//! and alerts.

pub mod helpers;

pub use helpers::*;
