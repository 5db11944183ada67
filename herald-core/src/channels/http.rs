//! Shared HTTP delivery for the chat, webhook and SMS channels

use crate::core::DeliveryError;
use crate::resilience::{retry, BackoffConfig};
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Per-request timeout applied by the shared client
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body kept in a `Status` error
const MAX_ERROR_BODY: usize = 512;

/// JSON poster with retries on transient failures (network errors, 5xx, 429)
#[derive(Debug, Clone)]
pub struct HttpPoster {
    service: &'static str,
    client: Client,
    backoff: BackoffConfig,
}

impl HttpPoster {
    pub fn new(service: &'static str) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(service, error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self {
            service,
            client,
            backoff: BackoffConfig::delivery(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// POST a JSON body
    pub async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), DeliveryError> {
        self.send_json(Method::POST, url, &HashMap::new(), None, body).await
    }

    /// Send a JSON body with an arbitrary method, extra headers and optional bearer token
    pub async fn send_json(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        let service = self.service;
        retry(&self.backoff, DeliveryError::is_retryable, || {
            let mut request = self.client.request(method.clone(), url).json(body);
            for (key, value) in headers {
                request = request.header(key.as_str(), value.as_str());
            }
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }
            async move {
                let response = request.send().await?;
                let status = response.status();
                if status.is_success() {
                    return Ok(());
                }
                let mut text = response.text().await.unwrap_or_default();
                if text.len() > MAX_ERROR_BODY {
                    let mut cut = MAX_ERROR_BODY;
                    while !text.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    text.truncate(cut);
                }
                Err(DeliveryError::Status {
                    service,
                    status: status.as_u16(),
                    body: text,
                })
            }
        })
        .await
    }
}
