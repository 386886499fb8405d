//! Background context: routes model requests to the lifecycle manager.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::{
    error::Result,
    lifecycle::{ModelManager, ModelState},
    prompts::PromptTemplates,
    protocol::{DEFAULT_MAX_TOKENS, Payload, Request, TASK_MAX_TOKENS},
    transport::{self, BACKGROUND, Handler, Port},
};

/// Handler owning the model manager
pub struct BackgroundService {
    manager: ModelManager,
    prompts: PromptTemplates,
}

impl BackgroundService {
    pub fn new(manager: ModelManager, prompts: PromptTemplates) -> Self {
        Self { manager, prompts }
    }

    /// Spawn the background context.
    ///
    /// With `autoload` the model starts loading immediately, before any
    /// other context asks for it.
    pub fn spawn(self, autoload: bool) -> (Port, JoinHandle<()>) {
        if autoload {
            self.manager.request_load();
        }
        transport::spawn_context(BACKGROUND, Arc::new(self))
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Payload> {
        let response = self.manager.generate(prompt, Some(max_tokens)).await?;
        Ok(Payload::Generated { response })
    }
}

fn load_state(state: &ModelState) -> Payload {
    Payload::LoadState {
        ready: state.is_ready(),
        loading: state.is_loading(),
        progress: state.progress,
    }
}

fn model_status(state: ModelState) -> Payload {
    Payload::ModelStatus {
        is_loading: state.is_loading(),
        is_ready: state.is_ready(),
        progress: state.progress,
        model_name: state.model_name,
    }
}

#[async_trait]
impl Handler for BackgroundService {
    async fn handle(&self, request: Request) -> Result<Payload> {
        match request {
            Request::LoadModel => Ok(load_state(&self.manager.request_load())),
            Request::GetModelStatus => Ok(model_status(self.manager.status())),
            Request::GenerateText { prompt, max_tokens } => {
                self.generate(&prompt, max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
                    .await
            }
            Request::SummarizeText { text } => {
                self.generate(&self.prompts.summarize(&text), TASK_MAX_TOKENS)
                    .await
            }
            Request::TranslateText { text } => {
                self.generate(&self.prompts.translate(&text), TASK_MAX_TOKENS)
                    .await
            }
            other @ (Request::GetPageContent | Request::GetSelection) => {
                Err(transport::unsupported(&other))
            }
        }
    }
}
