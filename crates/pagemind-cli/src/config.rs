//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "PAGEMIND_CONFIG_PATH";

/// Configuration for pagemind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model id or display name to load
    pub model: Option<String>,
    /// Smaller model tried when the main one fails to load; "none" disables
    pub fallback_model: Option<String>,
    /// Base URL of the local inference engine
    pub engine_url: Option<String>,
    /// Upper bound on tokens per generation
    pub max_tokens_ceiling: Option<u32>,
    /// Target language for summaries and translations
    pub language: Option<String>,
    /// Conversation history file
    pub history_path: Option<PathBuf>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagemind")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Default location of the conversation history
    pub fn default_history_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagemind")
            .join("history.json")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file. A missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the example config to `path` unless a file is already there
    pub fn init_at(path: &Path) -> std::io::Result<PathBuf> {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, example_config())?;
        Ok(path.to_path_buf())
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        Self::init_at(&Self::config_path())
    }

    /// History file to use
    pub fn history_path(&self) -> PathBuf {
        self.history_path
            .clone()
            .unwrap_or_else(Self::default_history_path)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# pagemind configuration file
# Place at ~/.config/pagemind/config.toml (Linux), or point PAGEMIND_CONFIG_PATH at it

# Model to load (id or display name)
model = "stablelm2:1.6b-zephyr"

# Smaller model tried once if the main one fails to load ("none" to disable)
fallback_model = "qwen2.5:0.5b-instruct"

# Local inference engine (defaults to $OLLAMA_HOST, then http://127.0.0.1:11434)
# engine_url = "http://127.0.0.1:11434"

# Upper bound on tokens per generation
max_tokens_ceiling = 512

# Language used for summaries and translations
language = "Japanese"

# Conversation history file (optional)
# history_path = "~/.local/share/pagemind/history.json"
"#
}
