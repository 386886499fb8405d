//! Popup controller: turns user intent into protocol requests and keeps the
//! transcript and model status line up to date.

use std::sync::Arc;

use crate::{
    conversation::{Conversation, ConversationEntry, PendingId, Role},
    events::Notification,
    history::HistoryStore,
    prompts::{self, PromptTemplates},
    protocol::{DEFAULT_MAX_TOKENS, Payload, Request, Response},
    transport::Port,
};

/// Assistant entry used when translation is requested with nothing selected
pub const NO_SELECTION: &str = "No text is selected";

/// Kind of status shown above the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub message: String,
}

impl StatusLine {
    fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Everything the popup needs to talk to the other contexts
pub struct PopupController {
    background: Port,
    content: Port,
    history: Arc<dyn HistoryStore>,
    prompts: PromptTemplates,
    conversation: Conversation,
    status: StatusLine,
    model_ready: bool,
}

impl PopupController {
    /// Open the popup: restore the transcript, then query the model status
    /// and ask for a load if nothing is happening yet.
    pub async fn open(
        background: Port,
        content: Port,
        history: Arc<dyn HistoryStore>,
        prompts: PromptTemplates,
    ) -> Self {
        let conversation = match history.load().await {
            Ok(entries) => Conversation::from_entries(entries),
            Err(e) => {
                tracing::warn!("Could not restore conversation: {}", e);
                Conversation::new()
            }
        };

        let mut popup = Self {
            background,
            content,
            history,
            prompts,
            conversation,
            status: StatusLine::new(StatusKind::Loading, "Checking model..."),
            model_ready: false,
        };
        popup.check_model_status().await;
        popup
    }

    async fn check_model_status(&mut self) {
        let status = self.background.send(Request::GetModelStatus).await;
        match status.into_result() {
            Ok(Payload::ModelStatus {
                is_loading: true, ..
            }) => self.set_status(StatusKind::Loading, "Loading model..."),
            Ok(Payload::ModelStatus {
                is_ready: true,
                model_name,
                ..
            }) => self.mark_ready(&model_name),
            Ok(_) => {
                self.set_status(StatusKind::Loading, "Initializing model...");
                let load = self.background.send(Request::LoadModel).await;
                if let Some(error) = load.error_message() {
                    self.mark_error(error);
                }
            }
            Err(error) => self.mark_error(&error),
        }
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn is_model_ready(&self) -> bool {
        self.model_ready
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        self.conversation.entries()
    }

    /// Reflect a lifecycle notification in the status line
    pub fn on_notification(&mut self, notification: &Notification) -> &StatusLine {
        match notification {
            Notification::ModelLoading => {
                self.model_ready = false;
                self.set_status(StatusKind::Loading, "Loading model...");
            }
            Notification::DownloadProgress { progress } => {
                self.set_status(StatusKind::Loading, format!("Loading model... {progress}%"));
            }
            Notification::ModelReady { model_name } => self.mark_ready(model_name),
            Notification::ModelError { error } => self.mark_error(error),
        }
        &self.status
    }

    /// Send a typed chat message. Returns the assistant's reply (or error
    /// text), or `None` when the message is blank.
    pub async fn send_message(&mut self, message: &str) -> Option<String> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }
        self.conversation.push(Role::User, message);
        let request = Request::GenerateText {
            prompt: prompts::chat_prompt(message),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
        };
        Some(self.dispatch("Thinking...", request).await)
    }

    /// Summarize the main content of the current page
    pub async fn summarize_page(&mut self) -> String {
        let response = self.content.send(Request::GetPageContent).await;
        let content = match response.into_result() {
            Ok(Payload::PageContent { content }) => content,
            Ok(other) => return self.reply_error(format!("unexpected response: {other:?}")).await,
            Err(error) => return self.reply_error(error).await,
        };

        self.conversation
            .push(Role::User, "Please summarize this page");
        self.dispatch("Summarizing page...", Request::SummarizeText { text: content })
            .await
    }

    /// Translate the current selection
    pub async fn translate_selection(&mut self) -> String {
        let response = self.content.send(Request::GetSelection).await;
        let text = match response.into_result() {
            Ok(Payload::Selection {
                text,
                has_selection: true,
            }) => text,
            Ok(_) => {
                self.conversation.push(Role::Assistant, NO_SELECTION);
                self.persist().await;
                return NO_SELECTION.to_string();
            }
            Err(error) => return self.reply_error(error).await,
        };

        let line = self.prompts.translate_request_line(&text);
        self.conversation.push(Role::User, line);
        self.dispatch("Translating...", Request::TranslateText { text })
            .await
    }

    /// Clear the transcript. Nothing happens unless `confirmed`.
    pub async fn clear(&mut self, confirmed: bool) -> bool {
        if !confirmed {
            return false;
        }
        self.conversation.clear();
        self.persist().await;
        true
    }

    /// Add a placeholder, send `request` to the background, then replace
    /// the placeholder with the result.
    async fn dispatch(&mut self, placeholder: &str, request: Request) -> String {
        let pending = self.conversation.push_pending(placeholder);
        self.persist().await;

        let response = self.background.send(request).await;
        self.resolve(pending, response).await
    }

    async fn resolve(&mut self, pending: PendingId, response: Response) -> String {
        let text = match response.generated_text() {
            Some(text) => text.to_string(),
            None => format!(
                "Error: {}",
                response.error_message().unwrap_or("empty response")
            ),
        };
        if self.conversation.resolve(pending, text.as_str()) {
            self.persist().await;
        }
        text
    }

    async fn reply_error(&mut self, error: impl Into<String>) -> String {
        let text = format!("An error occurred: {}", error.into());
        self.conversation.push(Role::Assistant, text.as_str());
        self.persist().await;
        text
    }

    async fn persist(&self) {
        if let Err(e) = self.history.save(self.conversation.entries()).await {
            tracing::warn!("Could not save conversation: {}", e);
        }
    }

    fn set_status(&mut self, kind: StatusKind, message: impl Into<String>) {
        self.status = StatusLine::new(kind, message);
    }

    fn mark_ready(&mut self, model_name: &str) {
        self.model_ready = true;
        self.set_status(StatusKind::Ready, format!("Model ready ({model_name})"));
    }

    fn mark_error(&mut self, error: &str) {
        self.model_ready = false;
        self.set_status(StatusKind::Error, format!("Error: {error}"));
    }
}
