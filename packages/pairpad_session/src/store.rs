//! Observable conversation log.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Point-in-time view of the store, as seen by subscribers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub entries: Vec<ConversationEntry>,
    pub is_loading: bool,
}

/// Append-only conversation history plus the in-flight flag.
///
/// Entries are kept in arrival order and are never removed. Every mutation
/// that changes something wakes the receivers returned by
/// [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct ConversationStore {
    tx: watch::Sender<ConversationSnapshot>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConversationSnapshot::default());
        Self { tx }
    }

    pub fn append(&self, entry: ConversationEntry) {
        self.tx.send_modify(|snapshot| snapshot.entries.push(entry));
    }

    pub fn all(&self) -> Vec<ConversationEntry> {
        self.tx.borrow().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_loading(&self, loading: bool) {
        self.tx.send_if_modified(|snapshot| {
            let changed = snapshot.is_loading != loading;
            snapshot.is_loading = loading;
            changed
        });
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().is_loading
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.tx.subscribe()
    }
}
