//! Slack incoming-webhook channel

use super::http::HttpPoster;
use super::Channel;
use crate::core::{Alert, DeliveryError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackSettings {
    pub webhook: String,
    pub channel: String,
    #[serde(default)]
    pub username: Option<String>,
}

pub struct SlackChannel {
    name: String,
    settings: SlackSettings,
    poster: HttpPoster,
}

impl SlackChannel {
    pub fn new(name: impl Into<String>, settings: SlackSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            poster: HttpPoster::new("slack"),
        }
    }

    pub fn with_poster(mut self, poster: HttpPoster) -> Self {
        self.poster = poster;
        self
    }

    pub fn payload(&self, alert: &Alert) -> serde_json::Value {
        let mut fields: Vec<serde_json::Value> = vec![
            json!({"title": "Severity", "value": alert.severity.as_str(), "short": true}),
            json!({"title": "Type", "value": alert.alert_type, "short": true}),
        ];
        let mut keys: Vec<&String> = alert.data.keys().collect();
        keys.sort();
        fields.extend(keys.into_iter().map(|key| {
            json!({"title": key, "value": alert.data[key].to_string(), "short": true})
        }));

        json!({
            "channel": self.settings.channel,
            "username": self.settings.username.as_deref().unwrap_or("herald"),
            "text": format!("{} *{}*", alert.severity.emoji(), alert.title),
            "attachments": [{
                "color": alert.severity.color_hex(),
                "text": alert.message,
                "fields": fields,
                "ts": alert.created_at.timestamp(),
            }],
        })
    }
}

#[async_trait]
impl Channel for SlackChannel {
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        self.poster
            .post_json(&self.settings.webhook, &self.payload(alert))
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "slack"
    }
}
