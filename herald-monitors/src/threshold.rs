//! Threshold operators and one-shot trigger state
//!
//! A [`Trigger`] fires once when its threshold condition starts holding and
//! re-arms itself as soon as a later evaluation finds the condition false.
//! [`Trigger::reset`] re-arms explicitly.

use chrono::{DateTime, Utc};
use herald_core::AlertSeverity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance for `equals`
pub const EQUALS_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperator {
    Above,
    Below,
    CrossesAbove,
    CrossesBelow,
    Equals,
}

impl ThresholdOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::CrossesAbove => "crosses_above",
            Self::CrossesBelow => "crosses_below",
            Self::Equals => "equals",
        }
    }

    /// Crossing operators compare against the previous sample
    pub fn needs_previous(&self) -> bool {
        matches!(self, Self::CrossesAbove | Self::CrossesBelow)
    }

    /// Whether `current` (with `previous`, for crossings) satisfies the operator
    ///
    /// A crossing without a previous sample never holds.
    pub fn evaluate(&self, previous: Option<f64>, current: f64, threshold: f64) -> bool {
        match self {
            Self::Above => current > threshold,
            Self::Below => current < threshold,
            Self::Equals => (current - threshold).abs() <= EQUALS_EPSILON,
            Self::CrossesAbove => previous.is_some_and(|p| p <= threshold && current > threshold),
            Self::CrossesBelow => previous.is_some_and(|p| p >= threshold && current < threshold),
        }
    }
}

impl fmt::Display for ThresholdOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "above" | ">" => Ok(Self::Above),
            "below" | "<" => Ok(Self::Below),
            "crosses_above" => Ok(Self::CrossesAbove),
            "crosses_below" => Ok(Self::CrossesBelow),
            "equals" | "==" => Ok(Self::Equals),
            other => Err(format!("unknown threshold operator '{}'", other)),
        }
    }
}

/// A value a metric is compared against, and the severity of the resulting alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub operator: ThresholdOperator,
    pub value: f64,
    #[serde(default = "default_severity")]
    pub severity: AlertSeverity,
}

fn default_severity() -> AlertSeverity {
    AlertSeverity::Warning
}

impl Threshold {
    pub fn new(operator: ThresholdOperator, value: f64) -> Self {
        Self {
            operator,
            value,
            severity: default_severity(),
        }
    }

    pub fn above(value: f64) -> Self {
        Self::new(ThresholdOperator::Above, value)
    }

    pub fn below(value: f64) -> Self {
        Self::new(ThresholdOperator::Below, value)
    }

    pub fn crosses_above(value: f64) -> Self {
        Self::new(ThresholdOperator::CrossesAbove, value)
    }

    pub fn crosses_below(value: f64) -> Self {
        Self::new(ThresholdOperator::CrossesBelow, value)
    }

    pub fn equals(value: f64) -> Self {
        Self::new(ThresholdOperator::Equals, value)
    }

    pub fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn holds(&self, previous: Option<f64>, current: f64) -> bool {
        self.operator.evaluate(previous, current, self.value)
    }
}

/// One-shot flag for a single threshold instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trigger {
    triggered: bool,
}

impl Trigger {
    /// Evaluate and return true only on the transition into the firing state
    pub fn check(&mut self, threshold: &Threshold, previous: Option<f64>, current: f64) -> bool {
        if threshold.holds(previous, current) {
            if self.triggered {
                return false;
            }
            self.triggered = true;
            true
        } else {
            self.triggered = false;
            false
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn reset(&mut self) {
        self.triggered = false;
    }
}

/// Latest value of a metric plus the value seen by the previous check
///
/// Crossing operators compare `checked` (what the last check evaluated)
/// with `current`, so several updates between two checks count as one move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading<T> {
    pub current: Option<T>,
    pub checked: Option<T>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Self {
            current: None,
            checked: None,
            updated_at: None,
        }
    }
}

impl<T: Copy> Reading<T> {
    pub fn update(&mut self, value: T, now: DateTime<Utc>) {
        self.current = Some(value);
        self.updated_at = Some(now);
    }

    /// `(previous, current)` for this check, advancing `checked`
    pub fn advance(&mut self) -> Option<(Option<T>, T)> {
        let current = self.current?;
        let previous = self.checked.replace(current);
        Some((previous, current))
    }
}
