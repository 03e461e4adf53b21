//! Continuity-token and de-duplication stores.

use std::path::PathBuf;

use tracing::debug;

use crate::store::{JsonStore, store_key};

/// Sender → continuity token (session id or chat id).
pub struct TokenStore {
    inner: JsonStore<String>,
}

impl TokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: JsonStore::open(path),
        }
    }

    pub fn get(&self, sender: &str) -> Option<String> {
        self.inner.get(sender)
    }

    pub fn set(&self, sender: &str, token: &str) {
        self.inner.set(sender, token.to_string());
    }

    pub fn delete(&self, sender: &str) -> bool {
        self.inner.delete(sender)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Entry count above which [`ProcessedMessageStore`] trims itself.
pub const PROCESSED_CAP: usize = 100;

/// Entries kept after a trim, most recent by insertion order.
pub const PROCESSED_KEEP: usize = 50;

/// Remembers the last message content handled per sender so identical
/// consecutive inputs can be skipped.
pub struct ProcessedMessageStore {
    inner: JsonStore<String>,
}

impl ProcessedMessageStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: JsonStore::open(path),
        }
    }

    pub fn is_processed(&self, sender: &str, content: &str) -> bool {
        self.inner.get(sender).is_some_and(|last| last == content)
    }

    pub fn mark_processed(&self, sender: &str, content: &str) {
        let key = store_key(sender);
        self.inner.update(|entries| {
            entries.insert(key, content.to_string());
            if entries.len() > PROCESSED_CAP {
                entries.keep_last(PROCESSED_KEEP);
                debug!(kept = PROCESSED_KEEP, "trimmed processed-message store");
            }
            ((), true)
        });
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Stored sender keys, oldest first.
    pub fn senders(&self) -> Vec<String> {
        self.inner.keys()
    }
}
