//! Continuity storage for the backends.
//!
//! Every store is a single pretty-printed JSON object on disk, keyed by the
//! normalized sender id and rewritten in full on each mutation:
//!
//! - `.claude_session_ids.json`: stateful-backend session ids
//! - `.cursor_chat_ids.json`: agent-backend chat ids
//! - `.message_history.json`: bounded per-sender history
//! - `.processed_messages.json`: last message seen per sender (de-duplication)

pub mod error;
pub mod history;
pub mod store;
pub mod tokens;

pub use {
    error::{Error, Result},
    history::{DEFAULT_MAX_PER_SENDER, HistoryEntry, HistoryStore, Role},
    store::{JsonStore, store_key},
    tokens::{ProcessedMessageStore, TokenStore},
};

/// File name of the stateful-backend session id store.
pub const SESSION_IDS_FILE: &str = ".claude_session_ids.json";

/// File name of the agent-backend chat id store.
pub const CHAT_IDS_FILE: &str = ".cursor_chat_ids.json";

/// File name of the message history store.
pub const HISTORY_FILE: &str = ".message_history.json";

/// File name of the processed-message store.
pub const PROCESSED_FILE: &str = ".processed_messages.json";
