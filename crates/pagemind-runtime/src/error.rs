//! Error types for pagemind-runtime

use thiserror::Error;

/// Result type alias using pagemind-runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving protocol requests
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An operation needed a loaded model
    #[error("Model is not ready")]
    NotReady,

    /// The engine rejected the load (after the fallback, if any)
    #[error("Model loading failed: {0}")]
    LoadFailed(String),

    /// The engine rejected a generation
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// The page or selection could not be read
    #[error("Page extraction failed: {0}")]
    ExtractionFailed(String),

    /// The receiving context does not serve this request type
    #[error("Unknown message type: {0}")]
    UnknownRequestType(String),

    /// The request named a known type but its payload did not parse
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The target context went away before answering
    #[error("Context '{0}' is not available")]
    Disconnected(String),

    /// Conversation history could not be read or written
    #[error("History error: {0}")]
    History(String),
}

impl Error {
    /// Wrap an engine generation failure, keeping its message
    pub fn generation(err: pagemind_engine::Error) -> Self {
        match err {
            pagemind_engine::Error::Generation(message) => Error::GenerationFailed(message),
            other => Error::GenerationFailed(other.to_string()),
        }
    }

    /// Wrap an engine load failure, keeping its message
    pub fn load(err: pagemind_engine::Error) -> Self {
        match err {
            pagemind_engine::Error::Load(message) => Error::LoadFailed(message),
            other => Error::LoadFailed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::History(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_literal() {
        assert_eq!(Error::NotReady.to_string(), "Model is not ready");
    }

    #[test]
    fn test_generation_keeps_engine_message() {
        let e = Error::generation(pagemind_engine::Error::Generation("boom".into()));
        assert_eq!(e, Error::GenerationFailed("boom".into()));
        assert_eq!(e.to_string(), "Generation failed: boom");
    }

    #[test]
    fn test_load_wraps_other_engine_errors() {
        let e = Error::load(pagemind_engine::Error::api(500, "no space left"));
        assert_eq!(
            e,
            Error::LoadFailed("Engine error (500): no space left".into())
        );
    }

    #[test]
    fn test_unknown_type_names_type() {
        let e = Error::UnknownRequestType("PING".into());
        assert_eq!(e.to_string(), "Unknown message type: PING");
    }
}
