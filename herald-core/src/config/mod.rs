//! Alerting configuration file (JSON)

pub mod types;

pub use types::*;

use crate::core::{AlertError, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

impl AlertingConfig {
    /// Load configuration from `path`, writing and returning the default
    /// configuration when the file does not exist yet
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "Created default alerting configuration");
            return Ok(config);
        }
        Self::load(path)
    }

    /// Load and validate an existing configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            AlertError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        info!(
            path = %path.display(),
            channels = config.channels.len(),
            rules = config.rules.len(),
            "Loaded alerting configuration"
        );
        Ok(config)
    }

    /// Write pretty-printed JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// Duplicate channel names and malformed rules are errors. A rule that
    /// names an unconfigured channel is only logged, since channels may be
    /// registered programmatically after loading.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(AlertError::Config(format!(
                    "{} channel is missing a name",
                    channel.channel_type
                )));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(AlertError::Config(format!(
                    "duplicate channel name '{}'",
                    channel.name
                )));
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.rules {
            if let Some(id) = rule.id.as_deref() {
                if !rule_ids.insert(id) {
                    return Err(AlertError::Config(format!("duplicate rule id '{}'", id)));
                }
            }
            rule.clone()
                .into_rule(&self.defaults)
                .validate()
                .map_err(|e| AlertError::Config(format!("rule '{}': {}", rule.name, e)))?;

            for channel in &rule.channels {
                if !names.contains(channel.as_str()) {
                    warn!(rule = %rule.name, channel = %channel, "Rule references unconfigured channel");
                }
            }
        }

        if self.engine.event_queue_size == 0 || self.engine.alert_queue_size == 0 {
            return Err(AlertError::Config("queue sizes must be positive".to_string()));
        }
        if self.engine.event_workers == 0 || self.engine.alert_workers == 0 {
            return Err(AlertError::Config("worker counts must be positive".to_string()));
        }

        Ok(())
    }
}
