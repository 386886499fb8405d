//! File-backed conversation history

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pagemind_runtime::{ConversationEntry, Error, HistoryRecord, HistoryStore, Result};

/// Stores the conversation as a single JSON record, overwritten on every save
#[derive(Debug, Clone)]
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for FileHistory {
    async fn load(&self) -> Result<Vec<ConversationEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let record: HistoryRecord = serde_json::from_str(&content)
            .map_err(|e| Error::History(format!("{}: {}", self.path.display(), e)))?;
        Ok(record.chat_history)
    }

    async fn save(&self, entries: &[ConversationEntry]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let record = HistoryRecord {
            chat_history: entries.to_vec(),
        };
        let content =
            serde_json::to_string_pretty(&record).map_err(|e| Error::History(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written record
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::trace!("Saved {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}
