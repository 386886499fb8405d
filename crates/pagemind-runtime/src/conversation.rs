//! Conversation transcript: ordered entries with replaceable placeholders.

use serde::{Deserialize, Serialize};

/// Who wrote an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
    /// Creation time in unix milliseconds
    pub timestamp: i64,
    /// Placeholder still waiting for its result
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl ConversationEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            pending: false,
        }
    }
}

/// Handle to a pending placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingId {
    epoch: u64,
    index: usize,
}

/// Conversation transcript.
///
/// Append-only except for [`Conversation::clear`]. A placeholder added with
/// [`Conversation::push_pending`] can be resolved exactly once.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    entries: Vec<ConversationEntry>,
    /// Bumped on clear so handles from before the clear go stale
    epoch: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted transcript
    pub fn from_entries(entries: Vec<ConversationEntry>) -> Self {
        Self { entries, epoch: 0 }
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationEntry> {
        self.entries.last()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.entries.push(ConversationEntry::new(role, text));
    }

    /// Append an assistant placeholder to be resolved later
    pub fn push_pending(&mut self, text: impl Into<String>) -> PendingId {
        let mut entry = ConversationEntry::new(Role::Assistant, text);
        entry.pending = true;
        self.entries.push(entry);
        PendingId {
            epoch: self.epoch,
            index: self.entries.len() - 1,
        }
    }

    /// Replace a placeholder's text. Returns false if it was already
    /// resolved or the conversation was cleared since.
    pub fn resolve(&mut self, id: PendingId, text: impl Into<String>) -> bool {
        if id.epoch != self.epoch {
            return false;
        }
        match self.entries.get_mut(id.index) {
            Some(entry) if entry.pending => {
                entry.text = text.into();
                entry.pending = false;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.epoch += 1;
    }
}
