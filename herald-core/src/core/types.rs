//! Core alerting types: severities, inbound events and outbound alerts

use super::value::{Fields, Value};
use crate::core::errors::{AlertError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational alerts (no action required)
    Info = 0,
    /// Warning alerts (should investigate)
    Warning = 1,
    /// Error alerts (requires attention)
    Error = 2,
    /// Critical alerts (immediate action required)
    Critical = 3,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Critical => "🚨",
        }
    }

    /// Hex colour used by chat integrations
    pub fn color_hex(&self) -> &'static str {
        match self {
            Self::Info => "#36a64f",
            Self::Warning => "#ffae42",
            Self::Error => "#ff4500",
            Self::Critical => "#d00000",
        }
    }

    /// Same colour as an RGB integer (Discord embeds)
    pub fn color_rgb(&self) -> u32 {
        match self {
            Self::Info => 0x36a64f,
            Self::Warning => 0xffae42,
            Self::Error => 0xff4500,
            Self::Critical => 0xd00000,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(AlertError::Validation(format!("unknown severity '{}'", other))),
        }
    }
}

/// Inbound signal from a producer (feed handler, strategy, risk manager, monitor)
///
/// Events are transient: each one is consumed by exactly one event-worker pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: AlertSeverity,
    pub source: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Fields,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            severity: AlertSeverity::Info,
            source: source.into(),
            message: String::new(),
            data: Fields::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.data.extend(fields);
        self
    }

    /// Data used for condition evaluation and message rendering
    ///
    /// The event's own payload plus its envelope (`type`, `severity`,
    /// `source`, `message`). Payload keys win over envelope keys.
    pub fn evaluation_fields(&self) -> Fields {
        let mut fields = self.data.clone();
        fields
            .entry("type".to_string())
            .or_insert_with(|| Value::from(self.event_type.as_str()));
        fields
            .entry("severity".to_string())
            .or_insert_with(|| Value::from(self.severity.as_str()));
        fields
            .entry("source".to_string())
            .or_insert_with(|| Value::from(self.source.as_str()));
        if !self.message.is_empty() {
            fields
                .entry("message".to_string())
                .or_insert_with(|| Value::from(self.message.as_str()));
        }
        fields
    }
}

/// User-facing record created when a rule fires
///
/// Lifecycle: active → acknowledged (optional) → resolved (terminal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Fields,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Active means not yet resolved (acknowledged alerts are still active)
    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    /// Mark the alert acknowledged. Resolved alerts cannot be acknowledged.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.resolved {
            return Err(AlertError::InvalidTransition {
                id: self.id.clone(),
                from: "resolved",
                to: "acknowledged",
            });
        }
        if !self.acknowledged {
            self.acknowledged = true;
            self.acknowledged_at = Some(now);
        }
        Ok(())
    }

    /// Mark the alert resolved. Returns `false` if it already was
    /// (the original `resolved_at` is kept).
    pub fn resolve(&mut self, now: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(now);
        true
    }

    /// Format alert for display
    pub fn format(&self) -> String {
        let mut output = format!(
            "[{}] {} {} ({}) - {}",
            self.severity.emoji(),
            self.severity.as_str().to_uppercase(),
            self.title,
            self.alert_type,
            self.message
        );

        if !self.data.is_empty() {
            let mut keys: Vec<&String> = self.data.keys().collect();
            keys.sort();
            output.push_str("\n  Details:");
            for key in keys {
                output.push_str(&format!("\n    {}: {}", key, self.data[key]));
            }
        }

        output
    }

    /// Single-line JSON, as written by the file channel and posted by webhooks
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    fn sample_alert() -> Alert {
        Alert {
            id: "a-1".to_string(),
            rule_id: "r-1".to_string(),
            alert_type: "price_alert".to_string(),
            severity: AlertSeverity::Critical,
            title: "BTC above 100".to_string(),
            message: "Price is 105.5".to_string(),
            data: fields! { "price" => 105.5 },
            created_at: Utc::now(),
            channels: vec!["console".to_string()],
            acknowledged: false,
            acknowledged_at: None,
            resolved: false,
            resolved_at: None,
        }
    }

    #[test]
    fn test_alert_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::Error);
        assert!(AlertSeverity::Error > AlertSeverity::Warning);
        assert!(AlertSeverity::Warning > AlertSeverity::Info);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("WARN".parse::<AlertSeverity>().unwrap(), AlertSeverity::Warning);
        assert_eq!("critical".parse::<AlertSeverity>().unwrap(), AlertSeverity::Critical);
        assert!("loud".parse::<AlertSeverity>().is_err());
    }

    #[test]
    fn test_severity_serde_lowercase() {
        let json = serde_json::to_string(&AlertSeverity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }

    #[test]
    fn test_new_alert_lifecycle_flags() {
        let alert = sample_alert();
        assert!(!alert.acknowledged);
        assert!(!alert.resolved);
        assert!(alert.is_active());
    }

    #[test]
    fn test_acknowledge_does_not_resolve() {
        let mut alert = sample_alert();
        alert.acknowledge(Utc::now()).unwrap();
        assert!(alert.acknowledged);
        assert!(alert.acknowledged_at.is_some());
        assert!(!alert.resolved);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut alert = sample_alert();
        let first = Utc::now();
        assert!(alert.resolve(first));
        assert!(!alert.resolve(first + chrono::Duration::seconds(5)));
        assert_eq!(alert.resolved_at, Some(first));
    }

    #[test]
    fn test_acknowledge_after_resolve_rejected() {
        let mut alert = sample_alert();
        alert.resolve(Utc::now());
        let err = alert.acknowledge(Utc::now()).unwrap_err();
        assert!(matches!(err, AlertError::InvalidTransition { .. }));
    }

    #[test]
    fn test_alert_formatting() {
        let formatted = sample_alert().format();
        assert!(formatted.contains("CRITICAL"));
        assert!(formatted.contains("BTC above 100"));
        assert!(formatted.contains("price: 105.5"));
    }

    #[test]
    fn test_alert_to_json() {
        let json = sample_alert().to_json().unwrap();
        assert!(json.contains("\"type\":\"price_alert\""));
        assert!(json.contains("\"severity\":\"critical\""));
        assert!(!json.contains("resolved_at"));
    }

    #[test]
    fn test_event_evaluation_fields_include_envelope() {
        let event = AlertEvent::new("price_alert", "feed")
            .with_severity(AlertSeverity::Warning)
            .with_field("price", 101.0);
        let fields = event.evaluation_fields();
        assert_eq!(fields["type"], Value::from("price_alert"));
        assert_eq!(fields["severity"], Value::from("warning"));
        assert_eq!(fields["source"], Value::from("feed"));
        assert!(!fields.contains_key("message"));
    }

    #[test]
    fn test_event_payload_wins_over_envelope() {
        let event = AlertEvent::new("system_event", "gateway").with_field("source", "binance");
        assert_eq!(event.evaluation_fields()["source"], Value::from("binance"));
    }
}
