use crate::core::AlertSeverity;
use crate::engine::EngineConfig;
use crate::rules::{AlertCondition, AlertRule, DEFAULT_COOLDOWN};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub engine: EngineSettings,
}

impl Default for AlertingConfig {
    /// A console channel and nothing else
    fn default() -> Self {
        let mut console = serde_json::Map::new();
        console.insert("min_severity".to_string(), serde_json::json!("info"));
        Self {
            enabled: true,
            channels: vec![ChannelConfig {
                channel_type: "console".to_string(),
                name: "console".to_string(),
                settings: console,
            }],
            rules: Vec::new(),
            defaults: DefaultsConfig::default(),
            engine: EngineSettings::default(),
        }
    }
}

impl AlertingConfig {
    /// Engine parameters derived from the `engine` and `defaults` sections
    pub fn engine_config(&self) -> EngineConfig {
        let e = &self.engine;
        EngineConfig {
            enabled: self.enabled,
            event_queue_size: e.event_queue_size,
            alert_queue_size: e.alert_queue_size,
            event_workers: e.event_workers,
            alert_workers: e.alert_workers,
            send_timeout: e.send_timeout,
            cleanup_interval: e.cleanup_interval,
            metrics_interval: e.metrics_interval,
            max_alerts: self.defaults.max_alerts,
            retention: Duration::from_secs(self.defaults.retention_days.saturating_mul(24 * 60 * 60)),
        }
    }
}

/// One channel entry: `type` and `name` plus type-specific keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "type")]
    pub channel_type: String,
    pub name: String,
    /// Everything else in the entry, handed to the channel factory
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl ChannelConfig {
    pub fn settings_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.settings.clone())
    }
}

/// Rule as written in a config file
///
/// Differs from [`AlertRule`] only in that `cooldown` may be omitted, in
/// which case `defaults.cooldown` applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub conditions: Vec<AlertCondition>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<Duration>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub channels: Vec<String>,
}

impl RuleConfig {
    pub fn into_rule(self, defaults: &DefaultsConfig) -> AlertRule {
        let mut rule = AlertRule::new(self.name, self.event_type, self.severity)
            .with_message(self.message)
            .with_cooldown(self.cooldown.unwrap_or(defaults.cooldown))
            .with_channels(self.channels);
        rule.conditions = self.conditions;
        rule.template = self.template;
        rule.enabled = self.enabled;
        if let Some(id) = self.id {
            rule.id = id;
        }
        rule
    }
}

impl From<&AlertRule> for RuleConfig {
    fn from(rule: &AlertRule) -> Self {
        Self {
            id: Some(rule.id.clone()).filter(|id| !id.is_empty()),
            name: rule.name.clone(),
            event_type: rule.event_type.clone(),
            severity: rule.severity,
            conditions: rule.conditions.clone(),
            message: rule.message.clone(),
            template: rule.template.clone(),
            cooldown: Some(rule.cooldown),
            enabled: rule.enabled,
            channels: rule.channels.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultsConfig {
    /// Cooldown for rules that do not set one
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    /// Alert store cap
    pub max_alerts: usize,
    /// Resolved alerts older than this many days are dropped
    pub retention_days: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            max_alerts: 10_000,
            retention_days: 30,
        }
    }
}

/// Queue sizes, worker counts and periodic intervals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub event_queue_size: usize,
    pub alert_queue_size: usize,
    pub event_workers: usize,
    pub alert_workers: usize,
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub metrics_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            event_queue_size: engine.event_queue_size,
            alert_queue_size: engine.alert_queue_size,
            event_workers: engine.event_workers,
            alert_workers: engine.alert_workers,
            send_timeout: engine.send_timeout,
            cleanup_interval: engine.cleanup_interval,
            metrics_interval: engine.metrics_interval,
        }
    }
}

fn default_true() -> bool {
    true
}
