//! Bounded per-sender history of relayed exchanges.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::{JsonStore, store_key};

/// Who said it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    You,
    Bot,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::You => f.write_str("You"),
            Self::Bot => f.write_str("Bot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Default number of entries kept per sender (ten exchanges).
pub const DEFAULT_MAX_PER_SENDER: usize = 20;

pub struct HistoryStore {
    inner: JsonStore<Vec<HistoryEntry>>,
    max_per_sender: usize,
}

impl HistoryStore {
    pub fn open(path: impl Into<PathBuf>, max_per_sender: usize) -> Self {
        Self {
            inner: JsonStore::open(path),
            max_per_sender,
        }
    }

    pub fn max_per_sender(&self) -> usize {
        self.max_per_sender
    }

    /// Append one entry, dropping the oldest beyond the per-sender cap.
    pub fn append(&self, sender: &str, role: Role, content: &str) {
        let key = store_key(sender);
        let max = self.max_per_sender;
        self.inner.update(|entries| {
            let mut log = entries.remove(&key).unwrap_or_default();
            log.push(HistoryEntry::new(role, content));
            let excess = log.len().saturating_sub(max);
            log.drain(..excess);
            entries.insert(key, log);
            ((), true)
        });
    }

    /// Entries for `sender`, oldest first. Empty for unknown senders.
    pub fn get(&self, sender: &str) -> Vec<HistoryEntry> {
        self.inner.get(sender).unwrap_or_default()
    }

    pub fn delete(&self, sender: &str) -> bool {
        self.inner.delete(sender)
    }
}
