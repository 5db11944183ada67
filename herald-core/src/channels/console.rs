//! Console channel: logs the alert at its severity level

use super::Channel;
use crate::core::{Alert, AlertSeverity, DeliveryError};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

pub struct ConsoleChannel {
    name: String,
    min_severity: AlertSeverity,
    /// Also print the formatted alert to stdout
    stdout: bool,
}

impl ConsoleChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_severity: AlertSeverity::Info,
            stdout: false,
        }
    }

    pub fn with_min_severity(mut self, severity: AlertSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn with_stdout(mut self, stdout: bool) -> Self {
        self.stdout = stdout;
        self
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        if alert.severity < self.min_severity {
            debug!(channel = %self.name, alert_id = %alert.id, "Below console severity floor, skipped");
            return Ok(());
        }

        let formatted = alert.format();
        match alert.severity {
            AlertSeverity::Info => info!(alert_id = %alert.id, rule_id = %alert.rule_id, "{}", formatted),
            AlertSeverity::Warning => warn!(alert_id = %alert.id, rule_id = %alert.rule_id, "{}", formatted),
            AlertSeverity::Error | AlertSeverity::Critical => {
                error!(alert_id = %alert.id, rule_id = %alert.rule_id, "{}", formatted)
            }
        }

        if self.stdout {
            println!("{}", formatted);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "console"
    }
}
