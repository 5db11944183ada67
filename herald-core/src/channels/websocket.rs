//! WebSocket broadcast channel
//!
//! The channel does not own sockets. A server accepts connections and calls
//! [`WebSocketChannel::attach`] for each one, then forwards every string
//! received on the returned receiver to its socket. A connection whose
//! buffer is full or whose receiver was dropped is detached on the next send.
//! Broadcasting with no attached connections succeeds.

use super::Channel;
use crate::core::{Alert, DeliveryError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

pub type ConnectionId = u64;

pub struct WebSocketChannel {
    name: String,
    buffer: usize,
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, mpsc::Sender<String>>>,
}

impl WebSocketChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_buffer(name, DEFAULT_CONNECTION_BUFFER)
    }

    pub fn with_buffer(name: impl Into<String>, buffer: usize) -> Self {
        Self {
            name: name.into(),
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection and get the stream of serialized alerts for it
    pub fn attach(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().insert(id, tx);
        debug!(channel = %self.name, connection = id, "WebSocket connection attached");
        (id, rx)
    }

    pub fn detach(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(&id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

#[async_trait]
impl Channel for WebSocketChannel {
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let payload = serde_json::json!({
            "type": "alert",
            "data": alert,
        })
        .to_string();

        let mut connections = self.connections.lock();
        connections.retain(|id, tx| match tx.try_send(payload.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = %self.name, connection = id, error = %e, "Dropping WebSocket connection");
                false
            }
        });
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "websocket"
    }
}
