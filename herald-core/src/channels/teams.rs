//! Microsoft Teams connector channel (MessageCard)

use super::http::HttpPoster;
use super::Channel;
use crate::core::{Alert, DeliveryError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsSettings {
    pub webhook: String,
}

pub struct TeamsChannel {
    name: String,
    webhook: String,
    poster: HttpPoster,
}

impl TeamsChannel {
    pub fn new(name: impl Into<String>, settings: TeamsSettings) -> Self {
        Self {
            name: name.into(),
            webhook: settings.webhook,
            poster: HttpPoster::new("teams"),
        }
    }

    pub fn payload(alert: &Alert) -> serde_json::Value {
        let mut keys: Vec<&String> = alert.data.keys().collect();
        keys.sort();
        let facts: Vec<serde_json::Value> = keys
            .into_iter()
            .map(|key| json!({"name": key, "value": alert.data[key].to_string()}))
            .collect();

        json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "themeColor": alert.severity.color_hex().trim_start_matches('#'),
            "summary": alert.title,
            "sections": [{
                "activityTitle": format!("{} {}", alert.severity.emoji(), alert.title),
                "activitySubtitle": format!("{} | {}", alert.severity, alert.alert_type),
                "text": alert.message,
                "facts": facts,
            }],
        })
    }
}

#[async_trait]
impl Channel for TeamsChannel {
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        self.poster.post_json(&self.webhook, &Self::payload(alert)).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "teams"
    }
}
