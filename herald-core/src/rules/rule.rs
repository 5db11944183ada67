//! Alert rule definition

use super::condition::AlertCondition;
use crate::core::{AlertError, AlertSeverity, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default minimum time between two firings of the same rule
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// A named definition of conditions, severity, message template, cooldown
/// and target channels
///
/// `last_triggered` and `trigger_count` are owned by the cooldown gate; the
/// copies here are filled in when a rule is read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: AlertSeverity,
    pub conditions: Vec<AlertCondition>,
    #[serde(default)]
    pub message: String,
    /// Named formatter template; used instead of `message` when registered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(with = "humantime_serde", default = "default_cooldown")]
    pub cooldown: Duration,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_count: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown() -> Duration {
    DEFAULT_COOLDOWN
}

impl AlertRule {
    pub fn new(name: impl Into<String>, event_type: impl Into<String>, severity: AlertSeverity) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            event_type: event_type.into(),
            severity,
            conditions: Vec::new(),
            message: String::new(),
            template: None,
            enabled: true,
            cooldown: DEFAULT_COOLDOWN,
            channels: Vec::new(),
            last_triggered: None,
            trigger_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_condition(mut self, condition: AlertCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check required fields, reporting the first one missing
    ///
    /// Channels are not checked against the registry: unknown channel names
    /// are skipped at delivery time.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AlertError::missing_field("name"));
        }
        if self.event_type.trim().is_empty() {
            return Err(AlertError::missing_field("type"));
        }
        if self.message.trim().is_empty() && self.template.is_none() {
            return Err(AlertError::missing_field("message"));
        }
        if self.conditions.is_empty() {
            return Err(AlertError::missing_field("conditions"));
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        Ok(())
    }
}
