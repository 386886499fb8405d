//! Ollama-compatible local runtime engine
//!
//! Loading a model pulls it into the runtime's store (streaming NDJSON
//! progress) and then asks the runtime to keep it resident. Generation uses
//! raw, non-streaming completions so the prompt template is applied exactly
//! once, by us.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{Generator, InferenceEngine};
use crate::{
    error::{Error, Result},
    types::{GenerationParams, LoadProgress, ModelSpec},
    ProgressReporter,
};

/// Default address of a local runtime
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Environment variable overriding the runtime address
pub const BASE_URL_ENV: &str = "OLLAMA_HOST";

/// How long the runtime should keep a loaded model in memory
const KEEP_ALIVE: &str = "30m";

/// Client for an Ollama-compatible runtime
#[derive(Clone)]
pub struct OllamaEngine {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaEngine {
    /// Create an engine talking to the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn pull(&self, model: &ModelSpec, progress: &ProgressReporter) -> Result<()> {
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&PullRequest {
                model: &model.id,
                stream: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let mut body = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut finished = false;

        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
            for line in drain_lines(&mut buffer) {
                finished |= handle_pull_line(&line, progress)?;
            }
        }
        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).into_owned();
            finished |= handle_pull_line(&line, progress)?;
        }

        if !finished {
            return Err(Error::Load(format!(
                "pull of '{}' ended without success status",
                model.id
            )));
        }
        Ok(())
    }

    async fn warm(&self, model: &ModelSpec) -> Result<()> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": model.id,
                "keep_alive": KEEP_ALIVE,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    async fn load(
        &self,
        model: &ModelSpec,
        progress: ProgressReporter,
    ) -> Result<Arc<dyn Generator>> {
        tracing::info!("Pulling model {} from {}", model.id, self.base_url);
        self.pull(model, &progress)
            .await
            .map_err(|e| missing_model(e, model))?;

        tracing::debug!("Warming model {}", model.id);
        self.warm(model)
            .await
            .map_err(|e| missing_model(e, model))?;
        progress.report(LoadProgress::Fraction(1.0));

        Ok(Arc::new(OllamaGenerator {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model_id: model.id.clone(),
        }))
    }
}

/// A model resident in the runtime
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = build_generate_request(&self.model_id, prompt, params);

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: GenerateResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(Error::Generation(error));
        }
        Ok(body.response)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    raw: bool,
    stream: bool,
    keep_alive: &'static str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

fn build_generate_request<'a>(
    model: &'a str,
    prompt: &'a str,
    params: &GenerationParams,
) -> GenerateRequest<'a> {
    GenerateRequest {
        model,
        prompt,
        raw: true,
        stream: false,
        keep_alive: KEEP_ALIVE,
        options: GenerateOptions {
            temperature: params.sampling.temperature,
            top_p: params.sampling.top_p,
            repeat_penalty: params.sampling.repetition_penalty,
            num_predict: params.max_new_tokens,
        },
    }
}

/// Report errors meaning the runtime has no such model as [`Error::ModelNotFound`]
fn missing_model(error: Error, model: &ModelSpec) -> Error {
    if error.is_missing_model() {
        tracing::debug!("Runtime does not know {}: {}", model.id, error);
        Error::ModelNotFound(model.id.clone())
    } else {
        error
    }
}

async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or(text);
    Error::api(status, message)
}

/// Split complete `\n`-terminated lines off the front of `buffer`.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Process one NDJSON pull status line. Returns `true` on the final success line.
fn handle_pull_line(line: &str, progress: &ProgressReporter) -> Result<bool> {
    let status: PullStatus = serde_json::from_str(line)?;
    if let Some(error) = status.error {
        return Err(Error::Load(error));
    }
    if let Some(p) = pull_progress(&status) {
        progress.report(p);
    }
    Ok(status.status == "success")
}

fn pull_progress(status: &PullStatus) -> Option<LoadProgress> {
    match (status.completed, status.total) {
        (Some(loaded), Some(total)) if total > 0 => Some(LoadProgress::Bytes { loaded, total }),
        _ => None,
    }
}
