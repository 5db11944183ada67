//! Channel construction from configuration
//!
//! Maps a channel type tag to a constructor. Each built-in constructor
//! deserializes a typed settings struct, so a missing or mistyped key is a
//! validation error at creation time rather than a delivery failure later.
//!
//! | type | settings |
//! |---|---|
//! | `console` | `min_severity?`, `stdout?` |
//! | `file` | `filename`, `min_severity?` |
//! | `email` | `smtp_host`, `smtp_port`, `username`, `password`, `from`, `to?` |
//! | `slack` | `webhook`, `channel`, `username?` |
//! | `webhook` | `url`, `method`, `headers?` |
//! | `discord` | `webhook` |
//! | `teams` | `webhook` |
//! | `sms` | `api_url`, `api_key`, `from`, `to` |
//! | `websocket` | `buffer?` |

use super::discord::DiscordSettings;
use super::email::EmailSettings;
use super::slack::SlackSettings;
use super::sms::SmsSettings;
use super::teams::TeamsSettings;
use super::webhook::WebhookSettings;
use super::websocket::DEFAULT_CONNECTION_BUFFER;
use super::{
    Channel, ConsoleChannel, DiscordChannel, EmailChannel, FileChannel, SlackChannel, SmsChannel,
    TeamsChannel, WebSocketChannel, WebhookChannel,
};
use crate::core::{AlertError, AlertSeverity, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a channel from its name and raw settings object
pub type ChannelConstructor =
    Box<dyn Fn(&str, &serde_json::Value) -> Result<Arc<dyn Channel>> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct ConsoleSettings {
    #[serde(default)]
    min_severity: Option<AlertSeverity>,
    #[serde(default)]
    stdout: bool,
}

#[derive(Debug, Deserialize)]
struct FileSettings {
    filename: String,
    #[serde(default)]
    min_severity: Option<AlertSeverity>,
}

#[derive(Debug, Deserialize)]
struct WebSocketSettings {
    #[serde(default)]
    buffer: Option<usize>,
}

/// Deserialize a settings object, naming the channel in the error
pub fn parse_settings<T: DeserializeOwned>(
    channel_type: &str,
    name: &str,
    settings: &serde_json::Value,
) -> Result<T> {
    let value = if settings.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        settings.clone()
    };
    serde_json::from_value(value).map_err(|e| {
        AlertError::Validation(format!("{} channel '{}': {}", channel_type, name, e))
    })
}

pub struct ChannelFactory {
    constructors: HashMap<String, ChannelConstructor>,
    /// WebSocket channels created so far, so a server can attach connections
    websockets: Arc<RwLock<HashMap<String, Arc<WebSocketChannel>>>>,
}

impl Default for ChannelFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelFactory {
    /// Factory with every built-in channel type registered
    pub fn new() -> Self {
        let mut factory = Self::empty();

        factory.register("console", |name, raw| {
            let s: ConsoleSettings = parse_settings("console", name, raw)?;
            let channel = ConsoleChannel::new(name)
                .with_min_severity(s.min_severity.unwrap_or(AlertSeverity::Info))
                .with_stdout(s.stdout);
            Ok(Arc::new(channel) as Arc<dyn Channel>)
        });
        factory.register("file", |name, raw| {
            let s: FileSettings = parse_settings("file", name, raw)?;
            if s.filename.trim().is_empty() {
                return Err(AlertError::missing_field("filename"));
            }
            let channel = FileChannel::new(name, s.filename)
                .with_min_severity(s.min_severity.unwrap_or(AlertSeverity::Info));
            Ok(Arc::new(channel) as Arc<dyn Channel>)
        });
        factory.register("email", |name, raw| {
            let s: EmailSettings = parse_settings("email", name, raw)?;
            Ok(Arc::new(EmailChannel::new(name, s)?) as Arc<dyn Channel>)
        });
        factory.register("slack", |name, raw| {
            let s: SlackSettings = parse_settings("slack", name, raw)?;
            Ok(Arc::new(SlackChannel::new(name, s)) as Arc<dyn Channel>)
        });
        factory.register("webhook", |name, raw| {
            let s: WebhookSettings = parse_settings("webhook", name, raw)?;
            Ok(Arc::new(WebhookChannel::new(name, s)?) as Arc<dyn Channel>)
        });
        factory.register("discord", |name, raw| {
            let s: DiscordSettings = parse_settings("discord", name, raw)?;
            Ok(Arc::new(DiscordChannel::new(name, s)) as Arc<dyn Channel>)
        });
        factory.register("teams", |name, raw| {
            let s: TeamsSettings = parse_settings("teams", name, raw)?;
            Ok(Arc::new(TeamsChannel::new(name, s)) as Arc<dyn Channel>)
        });
        factory.register("sms", |name, raw| {
            let s: SmsSettings = parse_settings("sms", name, raw)?;
            if s.to.is_empty() {
                return Err(AlertError::missing_field("to"));
            }
            Ok(Arc::new(SmsChannel::new(name, s)) as Arc<dyn Channel>)
        });

        let websockets = Arc::clone(&factory.websockets);
        factory.register("websocket", move |name, raw| {
            let s: WebSocketSettings = parse_settings("websocket", name, raw)?;
            let channel = Arc::new(WebSocketChannel::with_buffer(
                name,
                s.buffer.unwrap_or(DEFAULT_CONNECTION_BUFFER),
            ));
            websockets.write().insert(name.to_string(), Arc::clone(&channel));
            Ok(channel as Arc<dyn Channel>)
        });

        factory
    }

    /// Factory with no channel types registered
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
            websockets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register (or replace) the constructor for a type tag
    pub fn register<F>(&mut self, channel_type: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &serde_json::Value) -> Result<Arc<dyn Channel>> + Send + Sync + 'static,
    {
        self.constructors.insert(channel_type.into(), Box::new(constructor));
    }

    pub fn supports(&self, channel_type: &str) -> bool {
        self.constructors.contains_key(channel_type)
    }

    pub fn channel_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }

    /// Build a channel, validating its settings
    pub fn create(
        &self,
        channel_type: &str,
        name: &str,
        settings: &serde_json::Value,
    ) -> Result<Arc<dyn Channel>> {
        if name.trim().is_empty() {
            return Err(AlertError::missing_field("name"));
        }
        let constructor = self.constructors.get(channel_type).ok_or_else(|| {
            AlertError::Validation(format!("unknown channel type '{}'", channel_type))
        })?;
        let channel = constructor(name, settings)?;
        debug!(channel = %name, channel_type, "Channel created");
        Ok(channel)
    }

    /// WebSocket channel created under `name`, if any
    pub fn websocket(&self, name: &str) -> Option<Arc<WebSocketChannel>> {
        self.websockets.read().get(name).cloned()
    }

    pub fn websockets(&self) -> Vec<Arc<WebSocketChannel>> {
        self.websockets.read().values().cloned().collect()
    }
}

impl std::fmt::Debug for ChannelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFactory")
            .field("types", &self.channel_types())
            .finish()
    }
}
