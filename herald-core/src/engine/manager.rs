//! Configuration-driven assembly of an engine with its channels and rules

use super::AlertEngine;
use crate::channels::{ChannelFactory, WebSocketChannel};
use crate::config::{AlertingConfig, ChannelConfig};
use crate::core::{AlertError, EngineState, Result};
use crate::format::MessageFormatter;
use crate::monitoring::MetricsRegistry;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Owns one engine built from an [`AlertingConfig`]
///
/// There is no process-wide instance: callers construct a manager and pass
/// `engine()` to whatever produces events.
pub struct AlertManager {
    engine: Arc<AlertEngine>,
    factory: ChannelFactory,
    config: AlertingConfig,
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AlertManager {
    pub fn from_config(config: AlertingConfig) -> Result<Self> {
        Self::with_factory(config, ChannelFactory::new())
    }

    /// Build with a caller-supplied factory (custom channel types)
    pub fn with_factory(config: AlertingConfig, factory: ChannelFactory) -> Result<Self> {
        config.validate()?;

        let registry = MetricsRegistry::new()
            .map_err(|e| AlertError::Config(format!("metrics registry: {}", e)))?;
        let engine = Arc::new(AlertEngine::with_parts(
            config.engine_config(),
            Arc::new(MessageFormatter::new()),
            registry,
        ));

        let manager = Self {
            engine,
            factory,
            config,
        };

        for channel in &manager.config.channels {
            manager.add_channel(channel)?;
        }
        for rule in &manager.config.rules {
            manager
                .engine
                .add_rule(rule.clone().into_rule(&manager.config.defaults))?;
        }

        info!(
            channels = manager.config.channels.len(),
            rules = manager.config.rules.len(),
            enabled = manager.config.enabled,
            "Alert manager initialized"
        );
        Ok(manager)
    }

    /// Load (or create) the configuration at `path` and build from it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(AlertingConfig::load_or_create(path)?)
    }

    pub fn engine(&self) -> &Arc<AlertEngine> {
        &self.engine
    }

    pub fn config(&self) -> &AlertingConfig {
        &self.config
    }

    pub fn factory(&self) -> &ChannelFactory {
        &self.factory
    }

    /// Create a channel through the factory and register it with the engine
    pub fn add_channel(&self, channel: &ChannelConfig) -> Result<()> {
        let created = self.factory.create(
            &channel.channel_type,
            &channel.name,
            &channel.settings_value(),
        )?;
        self.engine.register_channel(created);
        Ok(())
    }

    /// WebSocket channel configured under `name`, for attaching connections
    pub fn websocket(&self, name: &str) -> Option<Arc<WebSocketChannel>> {
        self.factory.websocket(name)
    }

    pub fn start(&self) -> Result<()> {
        self.engine.start()
    }

    /// Stop the engine if it is running; a manager that never started shuts down trivially
    pub async fn shutdown(&self) -> Result<()> {
        match self.engine.state() {
            EngineState::Running => self.engine.stop().await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::core::AlertSeverity;
    use crate::rules::{AlertCondition, AlertRule};

    fn config_with_rule() -> AlertingConfig {
        let mut config = AlertingConfig::default();
        config.rules.push(RuleConfig::from(
            &AlertRule::new("High", "price_alert", AlertSeverity::Warning)
                .with_condition(AlertCondition::gt("price", 1.0))
                .with_message("m")
                .with_channel("console"),
        ));
        config
    }

    #[test]
    fn test_from_config_registers_channels_and_rules() {
        let manager = AlertManager::from_config(config_with_rule()).unwrap();
        let channels = manager.engine().get_channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel_type, "console");
        assert_eq!(manager.engine().get_rules().len(), 1);
    }

    #[test]
    fn test_unknown_channel_type_fails() {
        let mut config = AlertingConfig::default();
        config.channels[0].channel_type = "pigeon".to_string();
        assert!(AlertManager::from_config(config).unwrap_err().is_validation());
    }

    #[test]
    fn test_websocket_lookup() {
        let mut config = AlertingConfig::default();
        config.channels.push(ChannelConfig {
            channel_type: "websocket".to_string(),
            name: "ws".to_string(),
            settings: Default::default(),
        });
        let manager = AlertManager::from_config(config).unwrap();
        assert!(manager.websocket("ws").is_some());
        assert!(manager.websocket("console").is_none());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let manager = AlertManager::from_config(config_with_rule()).unwrap();
        manager.start().unwrap();
        assert_eq!(manager.engine().state(), EngineState::Running);
        manager.shutdown().await.unwrap();
        assert_eq!(manager.engine().state(), EngineState::Stopped);
        manager.shutdown().await.unwrap();
    }
}
