//! Discord webhook channel

use super::http::HttpPoster;
use super::Channel;
use crate::core::{Alert, DeliveryError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordSettings {
    pub webhook: String,
}

pub struct DiscordChannel {
    name: String,
    webhook: String,
    poster: HttpPoster,
}

impl DiscordChannel {
    pub fn new(name: impl Into<String>, settings: DiscordSettings) -> Self {
        Self {
            name: name.into(),
            webhook: settings.webhook,
            poster: HttpPoster::new("discord"),
        }
    }

    pub fn payload(alert: &Alert) -> serde_json::Value {
        let mut keys: Vec<&String> = alert.data.keys().collect();
        keys.sort();
        let fields: Vec<serde_json::Value> = keys
            .into_iter()
            .map(|key| json!({"name": key, "value": alert.data[key].to_string(), "inline": true}))
            .collect();

        json!({
            "embeds": [{
                "title": format!("{} {}", alert.severity.emoji(), alert.title),
                "description": alert.message,
                "color": alert.severity.color_rgb(),
                "fields": fields,
                "timestamp": alert.created_at.to_rfc3339(),
            }],
        })
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        self.poster.post_json(&self.webhook, &Self::payload(alert)).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "discord"
    }
}
