//! Conversation persistence

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationEntry;
use crate::error::Result;

/// The single durable record holding the conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default)]
    pub chat_history: Vec<ConversationEntry>,
}

/// Where the conversation is persisted. Every save overwrites the record.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the persisted conversation; empty if nothing was saved yet
    async fn load(&self) -> Result<Vec<ConversationEntry>>;

    /// Overwrite the persisted conversation
    async fn save(&self, entries: &[ConversationEntry]) -> Result<()>;
}

/// In-memory store for sessions that should leave nothing behind
#[derive(Debug, Default)]
pub struct MemoryHistory {
    record: Mutex<Option<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn load(&self) -> Result<Vec<ConversationEntry>> {
        Ok(self
            .record
            .lock()
            .as_ref()
            .map(|r| r.chat_history.clone())
            .unwrap_or_default())
    }

    async fn save(&self, entries: &[ConversationEntry]) -> Result<()> {
        *self.record.lock() = Some(HistoryRecord {
            chat_history: entries.to_vec(),
        });
        Ok(())
    }
}
