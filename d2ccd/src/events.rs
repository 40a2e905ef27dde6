//! Event broadcast for session activity (JSON lines).

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_BUFFER: usize = 256;

pub const SESSION_OPENED: &str = "session_opened";
pub const REQUEST_COMMITTED: &str = "request_committed";
pub const REQUEST_DISCARDED: &str = "request_discarded";
pub const PROTOCOL_ERROR: &str = "protocol_error";
pub const SESSION_CLOSED: &str = "session_closed";

#[derive(Debug, Clone, Serialize)]
pub struct CommittedEvent {
    pub connection: u64,
    pub version: u16,
    pub flags: u16,
    pub argv: Vec<String>,
    pub data_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEventData {
    pub connection: u64,
    pub committed: u64,
    pub discarded: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtocolErrorEvent {
    pub connection: u64,
    pub code: String,
    pub error: String,
}

/// Broadcast channel for daemon events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
}

impl EventBus {
    /// The buffer is never smaller than `DEFAULT_BUFFER`.
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(DEFAULT_BUFFER);
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit a structured event. Dropped silently when nobody listens.
    pub fn emit<T: Serialize>(&self, event: &str, data: &T) {
        let payload = json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(serialized) => {
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!("Failed to serialize event {}: {}", event, err),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}
