//! SMS gateway channel
//!
//! Posts `{from, to, body}` to a JSON SMS API authenticated with a bearer
//! key. The body is kept to a single segment-friendly line.

use super::http::HttpPoster;
use super::Channel;
use crate::core::{Alert, DeliveryError};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

const MAX_SMS_CHARS: usize = 160;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsSettings {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub to: Vec<String>,
}

pub struct SmsChannel {
    name: String,
    settings: SmsSettings,
    poster: HttpPoster,
}

impl SmsChannel {
    pub fn new(name: impl Into<String>, settings: SmsSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            poster: HttpPoster::new("sms"),
        }
    }

    pub fn body(alert: &Alert) -> String {
        let text = format!(
            "[{}] {}: {}",
            alert.severity.as_str().to_uppercase(),
            alert.title,
            alert.message
        );
        if text.chars().count() <= MAX_SMS_CHARS {
            return text;
        }
        let mut short: String = text.chars().take(MAX_SMS_CHARS - 3).collect();
        short.push_str("...");
        short
    }
}

#[async_trait]
impl Channel for SmsChannel {
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        if self.settings.to.is_empty() {
            return Err(DeliveryError::Rejected("no SMS recipients configured".to_string()));
        }
        let body = json!({
            "from": self.settings.from,
            "to": self.settings.to,
            "body": Self::body(alert),
        });
        self.poster
            .send_json(
                Method::POST,
                &self.settings.api_url,
                &HashMap::new(),
                Some(&self.settings.api_key),
                &body,
            )
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "sms"
    }
}
