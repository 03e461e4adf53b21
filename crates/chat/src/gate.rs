use {
    clirelay_common::{ChatMessage, normalize_sender},
    tracing::debug,
};

/// Outcome of [`MessageGate::should_process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAction {
    pub should_respond: bool,
    pub reason: Option<String>,
}

impl MessageAction {
    fn allow() -> Self {
        Self {
            should_respond: true,
            reason: None,
        }
    }

    fn deny(sender: &str) -> Self {
        Self {
            should_respond: false,
            reason: Some(format!("Unauthorized sender: {sender}")),
        }
    }
}

/// Single-identity access gate.
#[derive(Debug, Clone)]
pub struct MessageGate {
    allowed_raw: String,
    allowed: String,
}

impl MessageGate {
    pub fn new(allowed: impl Into<String>) -> Self {
        let allowed_raw = allowed.into();
        Self {
            allowed: normalize_sender(&allowed_raw),
            allowed_raw,
        }
    }

    /// Allowed iff the normalized sender equals or contains the normalized
    /// allowed id. An allowed id without digits only matches itself verbatim.
    pub fn should_process(&self, message: &ChatMessage) -> MessageAction {
        if self.allows(&message.sender) {
            MessageAction::allow()
        } else {
            debug!(sender = %message.sender, "blocked sender");
            MessageAction::deny(&message.sender)
        }
    }

    pub fn allows(&self, sender: &str) -> bool {
        if self.allowed.is_empty() {
            return sender == self.allowed_raw;
        }
        normalize_sender(sender).contains(&self.allowed)
    }

    /// Exact check for transports with stable numeric ids, such as a
    /// Telegram chat: normalized ids must be equal.
    pub fn allows_exact(&self, sender: &str) -> bool {
        if self.allowed.is_empty() {
            return sender == self.allowed_raw;
        }
        normalize_sender(sender) == self.allowed
    }

    /// Messages that pass the gate, in order.
    pub fn filter_messages(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        messages
            .into_iter()
            .filter(|m| self.allows(&m.sender))
            .collect()
    }
}
