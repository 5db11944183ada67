//! Generic webhook channel: sends the alert JSON to a URL

use super::http::HttpPoster;
use super::Channel;
use crate::core::{Alert, AlertError, DeliveryError, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

pub struct WebhookChannel {
    name: String,
    url: String,
    method: Method,
    headers: HashMap<String, String>,
    poster: HttpPoster,
}

impl WebhookChannel {
    /// Fails when the method is not a valid HTTP method token
    pub fn new(name: impl Into<String>, settings: WebhookSettings) -> Result<Self> {
        let method = Method::from_bytes(settings.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| AlertError::Validation(format!("invalid HTTP method '{}'", settings.method)))?;
        if settings.url.trim().is_empty() {
            return Err(AlertError::missing_field("url"));
        }
        Ok(Self {
            name: name.into(),
            url: settings.url,
            method,
            headers: settings.headers,
            poster: HttpPoster::new("webhook"),
        })
    }

    pub fn with_poster(mut self, poster: HttpPoster) -> Self {
        self.poster = poster;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    async fn send(&self, alert: &Alert) -> std::result::Result<(), DeliveryError> {
        let body = serde_json::to_value(alert)?;
        self.poster
            .send_json(self.method.clone(), &self.url, &self.headers, None, &body)
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }
}
