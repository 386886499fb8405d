//! Inference engine implementations

pub mod ollama;

use std::sync::Arc;

use crate::{GenerationParams, ModelSpec, ProgressReporter, Result};
use async_trait::async_trait;

/// A model that has been loaded and can produce text
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a continuation of an already-formatted prompt
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Trait for local inference engines
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Fetch (if needed) and load a model, reporting progress along the way
    async fn load(
        &self,
        model: &ModelSpec,
        progress: ProgressReporter,
    ) -> Result<Arc<dyn Generator>>;
}

/// Get the engine base URL from a provided value or the environment
pub fn engine_url(provided: Option<&str>, env_var: &str, default: &str) -> String {
    if let Some(url) = provided {
        return url.trim_end_matches('/').to_string();
    }

    std::env::var(env_var)
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| default.to_string())
}
