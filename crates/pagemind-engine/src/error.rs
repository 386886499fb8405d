//! Error types for pagemind-engine

use thiserror::Error;

/// Result type alias using pagemind-engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to an inference engine
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine returned an error response
    #[error("Engine error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Model not found in the registry or on the engine
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Model could not be loaded
    #[error("Load failed: {0}")]
    Load(String),

    /// Generation was rejected by the engine
    #[error("Generation failed: {0}")]
    Generation(String),
}

impl Error {
    /// Create an API error from an HTTP status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error means the engine is unreachable (nothing listening, DNS, timeout)
    pub fn is_unreachable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error means the engine does not know the model
    pub fn is_missing_model(&self) -> bool {
        let message = match self {
            Error::ModelNotFound(_) | Error::Api { status: 404, .. } => return true,
            Error::Api { message, .. } | Error::Load(message) => message,
            _ => return false,
        };
        let msg = message.to_lowercase();
        msg.contains("not found")
            || msg.contains("file does not exist")
            || msg.contains("pull model manifest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_typed_variant() {
        assert!(Error::ModelNotFound("phi".into()).is_missing_model());
    }

    #[test]
    fn test_missing_model_api_404() {
        assert!(Error::api(404, "nope").is_missing_model());
    }

    #[test]
    fn test_missing_model_api_message() {
        let e = Error::api(500, "pull model manifest: file does not exist");
        assert!(e.is_missing_model());
    }

    #[test]
    fn test_missing_model_from_pull_status_line() {
        assert!(Error::Load("pull model manifest: file does not exist".into()).is_missing_model());
        assert!(!Error::Load("disk full".into()).is_missing_model());
    }

    #[test]
    fn test_not_missing_model_generation() {
        assert!(!Error::Generation("oom".into()).is_missing_model());
        assert!(!Error::api(500, "out of memory").is_missing_model());
    }

    #[test]
    fn test_display_keeps_underlying_message() {
        let e = Error::Generation("context window exceeded".into());
        assert_eq!(e.to_string(), "Generation failed: context window exceeded");
    }

    #[test]
    fn test_unreachable_only_for_http() {
        assert!(!Error::Load("x".into()).is_unreachable());
        assert!(!Error::api(503, "busy").is_unreachable());
    }
}
