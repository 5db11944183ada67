//! Sparse alert filter

use crate::core::{Alert, AlertSeverity, Fields, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Every `None` field imposes no constraint; the default filter matches all
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<AlertSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_type(mut self, alert_type: impl Into<String>) -> Self {
        self.alert_type = Some(alert_type.into());
        self
    }

    pub fn severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }

    pub fn acknowledged(mut self, acknowledged: bool) -> Self {
        self.acknowledged = Some(acknowledged);
        self
    }

    pub fn rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    /// Build from a loosely-typed key/value map
    ///
    /// Recognised keys: `type`, `severity`, `resolved`, `acknowledged`,
    /// `rule_id`. Unknown keys and values of the wrong type are ignored.
    pub fn from_fields(fields: &Fields) -> Self {
        let mut filter = Self::default();
        for (key, value) in fields {
            match (key.as_str(), value) {
                ("type", Value::Str(s)) => filter.alert_type = Some(s.clone()),
                ("severity", Value::Str(s)) => match s.parse() {
                    Ok(severity) => filter.severity = Some(severity),
                    Err(_) => debug!(severity = %s, "Ignoring unknown severity in alert filter"),
                },
                ("resolved", Value::Bool(b)) => filter.resolved = Some(*b),
                ("acknowledged", Value::Bool(b)) => filter.acknowledged = Some(*b),
                ("rule_id" | "ruleId", Value::Str(s)) => filter.rule_id = Some(s.clone()),
                (other, value) => {
                    debug!(key = other, value_type = value.type_name(), "Ignoring alert filter key")
                }
            }
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.alert_type.as_ref().map_or(true, |t| *t == alert.alert_type)
            && self.severity.map_or(true, |s| s == alert.severity)
            && self.resolved.map_or(true, |r| r == alert.resolved)
            && self.acknowledged.map_or(true, |a| a == alert.acknowledged)
            && self.rule_id.as_ref().map_or(true, |id| *id == alert.rule_id)
    }
}
