//! Delivery channels
//!
//! A channel is any named target that can deliver an [`Alert`]. Channels are
//! held behind `Arc` by the registry and must tolerate concurrent `send`
//! calls: several alert workers may deliver to the same channel at once.
//!
//! Built-in channel types:
//! - `console`: tracing event at the alert's severity plus a stdout line
//! - `file`: one JSON line per alert
//! - `websocket`: broadcast to attached connections
//! - `email`: SMTP via lettre
//! - `slack`, `webhook`, `discord`, `teams`, `sms`: HTTP via reqwest

pub mod console;
pub mod discord;
pub mod email;
pub mod factory;
pub mod file;
pub mod http;
pub mod slack;
pub mod sms;
pub mod teams;
pub mod webhook;
pub mod websocket;

use crate::core::{Alert, AlertError, DeliveryError, EntityKind, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub use console::ConsoleChannel;
pub use discord::DiscordChannel;
pub use email::EmailChannel;
pub use factory::{ChannelConstructor, ChannelFactory};
pub use file::FileChannel;
pub use slack::SlackChannel;
pub use sms::SmsChannel;
pub use teams::TeamsChannel;
pub use webhook::WebhookChannel;
pub use websocket::WebSocketChannel;

/// Delivery contract
#[async_trait]
pub trait Channel: Send + Sync {
    /// Deliver one alert. Failures are reported to the engine, never the producer.
    async fn send(&self, alert: &Alert) -> std::result::Result<(), DeliveryError>;

    /// Registry key
    fn name(&self) -> &str;

    /// Channel type tag (`console`, `file`, `slack`, ...)
    fn channel_type(&self) -> &str;
}

impl std::fmt::Debug for dyn Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("channel_type", &self.channel_type())
            .finish()
    }
}

/// Name/type pair describing a registered channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub channel_type: String,
}

/// Named channels. Re-registering a name replaces the previous channel.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        let replaced = self.channels.write().insert(name.clone(), channel).is_some();
        if replaced {
            info!(channel = %name, "Channel replaced");
        } else {
            debug!(channel = %name, "Channel registered");
        }
    }

    pub fn remove(&self, name: &str) -> Result<Arc<dyn Channel>> {
        self.channels
            .write()
            .remove(name)
            .ok_or_else(|| AlertError::not_found(EntityKind::Channel, name))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }

    /// Registered channels sorted by name
    pub fn list(&self) -> Vec<ChannelInfo> {
        let mut infos: Vec<ChannelInfo> = self
            .channels
            .read()
            .values()
            .map(|c| ChannelInfo {
                name: c.name().to_string(),
                channel_type: c.channel_type().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChannel;

    #[test]
    fn test_register_and_lookup() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(RecordingChannel::new("a")));
        assert!(registry.contains("a"));
        assert_eq!(
            registry.list(),
            vec![ChannelInfo {
                name: "a".to_string(),
                channel_type: "recording".to_string()
            }]
        );
    }

    #[test]
    fn test_reregister_last_write_wins() {
        let registry = ChannelRegistry::new();
        let first = Arc::new(RecordingChannel::new("a"));
        let second = Arc::new(RecordingChannel::new("a"));
        registry.register(first);
        registry.register(second.clone());
        assert_eq!(registry.len(), 1);
        let held = registry.get("a").unwrap();
        assert!(Arc::ptr_eq(
            &(held as Arc<dyn Channel>),
            &(second as Arc<dyn Channel>)
        ));
    }

    #[test]
    fn test_remove_twice_errors_second_time() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(RecordingChannel::new("a")));
        assert!(registry.remove("a").is_ok());
        assert!(registry.remove("a").err().unwrap().is_not_found());
        assert!(registry.remove("never").err().unwrap().is_not_found());
    }
}
