use serde::{Deserialize, Serialize};

/// One inbound message as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Raw sender identity (chat id, phone number). Not normalized.
    pub sender: String,
    pub content: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp,
        }
    }
}
