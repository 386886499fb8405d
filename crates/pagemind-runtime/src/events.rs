//! Lifecycle notification types

use serde::{Deserialize, Serialize};

/// Notifications broadcast by the model manager to every listening context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// A load attempt started
    ModelLoading,

    /// Download/load progress in percent
    DownloadProgress { progress: u8 },

    /// The model is loaded and can generate
    ModelReady {
        #[serde(rename = "modelName")]
        model_name: String,
    },

    /// The load attempt failed
    ModelError { error: String },
}

impl Notification {
    /// Check if this ends a load attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Notification::ModelReady { .. } | Notification::ModelError { .. }
        )
    }
}
