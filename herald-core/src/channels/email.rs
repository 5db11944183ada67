//! Email channel over SMTP (lettre, tokio transport)

use super::Channel;
use crate::core::{Alert, AlertError, DeliveryError, Result};
use crate::resilience::{retry, BackoffConfig};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
}

pub struct EmailChannel {
    name: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    backoff: BackoffConfig,
}

impl std::fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChannel")
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl EmailChannel {
    /// Build the SMTP transport and parse every address up front
    pub fn new(name: impl Into<String>, settings: EmailSettings) -> Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| AlertError::Validation(format!("invalid from address '{}': {}", settings.from, e)))?;
        let to = settings
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| AlertError::Validation(format!("invalid recipient '{}': {}", addr, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
            .map_err(|e| AlertError::Validation(format!("invalid SMTP host '{}': {}", settings.smtp_host, e)))?
            .port(settings.smtp_port);
        if !settings.username.is_empty() {
            builder = builder.credentials(Credentials::new(settings.username, settings.password));
        }

        Ok(Self {
            name: name.into(),
            transport: builder.build(),
            from,
            to,
            backoff: BackoffConfig::delivery(),
        })
    }

    pub fn subject(alert: &Alert) -> String {
        format!("[herald][{}] {}", alert.severity, alert.title)
    }

    pub fn body(alert: &Alert) -> String {
        let mut body = format!(
            "Alert: {}\nSeverity: {}\nType: {}\nRule: {}\nMessage: {}\nTime: {}",
            alert.title,
            alert.severity,
            alert.alert_type,
            alert.rule_id,
            alert.message,
            alert.created_at.to_rfc3339(),
        );
        let mut keys: Vec<&String> = alert.data.keys().collect();
        keys.sort();
        if !keys.is_empty() {
            body.push_str("\n\nDetails:");
            for key in keys {
                body.push_str(&format!("\n  {}: {}", key, alert.data[key]));
            }
        }
        body
    }

    fn message(&self, alert: &Alert) -> std::result::Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::subject(alert))
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .body(Self::body(alert))
            .map_err(|e| DeliveryError::Smtp(e.to_string()))
    }
}

#[async_trait]
impl Channel for EmailChannel {
    async fn send(&self, alert: &Alert) -> std::result::Result<(), DeliveryError> {
        if self.to.is_empty() {
            debug!(channel = %self.name, "No email recipients configured, nothing to send");
            return Ok(());
        }
        let message = self.message(alert)?;
        retry(
            &self.backoff,
            |e: &DeliveryError| matches!(e, DeliveryError::Smtp(_)),
            || {
                let message = message.clone();
                async move {
                    self.transport
                        .send(message)
                        .await
                        .map(|_| ())
                        .map_err(|e| DeliveryError::Smtp(e.to_string()))
                }
            },
        )
        .await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "email"
    }
}
