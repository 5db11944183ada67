//! File channel: appends one JSON line per alert

use super::Channel;
use crate::core::{Alert, AlertSeverity, DeliveryError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct FileChannel {
    name: String,
    path: PathBuf,
    min_severity: AlertSeverity,
    /// Serializes appends so concurrent sends never interleave lines
    write_lock: Mutex<()>,
}

impl FileChannel {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            min_severity: AlertSeverity::Info,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_min_severity(mut self, severity: AlertSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Channel for FileChannel {
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        if alert.severity < self.min_severity {
            return Ok(());
        }

        let mut line = serde_json::to_string(alert)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "file"
    }
}
