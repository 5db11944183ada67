//! Error types for alerting operations
//!
//! Two layers:
//! - [`AlertError`]: everything a caller of the engine, store or factory can see
//!   synchronously (validation, not-found, backpressure, lifecycle).
//! - [`DeliveryError`]: a single channel's `send` failing. These never reach the
//!   producer; the alert worker records them in metrics and logs.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlertError>;

/// What kind of entity a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Rule,
    Channel,
    Alert,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rule => "rule",
            Self::Channel => "channel",
            Self::Alert => "alert",
        })
    }
}

/// Which bounded queue rejected work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Event,
    Alert,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Event => "event",
            Self::Alert => "alert",
        })
    }
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Error)]
pub enum AlertError {
    /// Rule, channel or config entry missing a required field or carrying a bad value
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: EntityKind, id: String },

    /// Backpressure: the queue had no capacity and the caller was not blocked
    #[error("{0} queue full")]
    QueueFull(QueueKind),

    #[error("cannot {operation} while engine is {state}")]
    Lifecycle {
        operation: &'static str,
        state: EngineState,
    },

    #[error("alert '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("delivery to channel '{channel}' failed")]
    Delivery {
        channel: String,
        #[source]
        source: DeliveryError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no tokio runtime available to {0}")]
    NoRuntime(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AlertError {
    pub fn missing_field(field: &str) -> Self {
        Self::Validation(format!("missing required field `{}`", field))
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::QueueFull(_))
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle { .. })
    }
}

/// A single channel failed to deliver an alert
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    /// Channel refused the alert (bad recipient, payload rejected upstream)
    #[error("rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    /// Transient failures worth retrying: network errors and 5xx/429 responses
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::Smtp(_) => "smtp",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Timeout(_) => "timeout",
            Self::Rejected(_) => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = AlertError::missing_field("name");
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "validation failed: missing required field `name`"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = AlertError::not_found(EntityKind::Channel, "slack-ops");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "channel 'slack-ops' not found");
    }

    #[test]
    fn test_lifecycle_message() {
        let err = AlertError::Lifecycle {
            operation: "process events",
            state: EngineState::Stopped,
        };
        assert_eq!(err.to_string(), "cannot process events while engine is stopped");
    }

    #[test]
    fn test_delivery_error_source_chain() {
        use std::error::Error as _;
        let err = AlertError::Delivery {
            channel: "hooks".to_string(),
            source: DeliveryError::Timeout(Duration::from_secs(30)),
        };
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("send timed out after 30s"));
    }

    #[test]
    fn test_status_retryability() {
        let server = DeliveryError::Status {
            service: "slack",
            status: 503,
            body: String::new(),
        };
        let client = DeliveryError::Status {
            service: "slack",
            status: 400,
            body: "invalid_payload".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!DeliveryError::Rejected("x".into()).is_retryable());
    }
}
