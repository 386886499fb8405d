//! Context actions on selected text ("summarize selection", "translate selection").

use std::fmt;
use std::str::FromStr;

use crate::{
    error::Error,
    protocol::{Payload, Request},
    transport::Port,
};

/// An action the user can run on selected text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    Summarize,
    Translate,
}

impl ContextAction {
    /// Action identifier as used by menu entries
    pub fn id(&self) -> &'static str {
        match self {
            ContextAction::Summarize => "summarize",
            ContextAction::Translate => "translate",
        }
    }

    /// The background request this action synthesizes
    pub fn request(&self, text: impl Into<String>) -> Request {
        let text = text.into();
        match self {
            ContextAction::Summarize => Request::SummarizeText { text },
            ContextAction::Translate => Request::TranslateText { text },
        }
    }

    /// Toast shown while the request is in flight
    pub fn pending_toast(&self) -> Toast {
        let message = match self {
            ContextAction::Summarize => "Summarizing...",
            ContextAction::Translate => "Translating...",
        };
        Toast::new(ToastKind::Info, message)
    }

    /// Heading for the result
    pub fn result_title(&self) -> &'static str {
        match self {
            ContextAction::Summarize => "Summary",
            ContextAction::Translate => "Translation",
        }
    }

    /// Send the action's request to the background and wait for the outcome
    pub async fn run(&self, text: &str, background: &Port) -> ActionOutcome {
        tracing::debug!("Running {} on {} chars", self.id(), text.len());
        match background.send(self.request(text)).await.into_result() {
            Ok(payload) => match payload {
                Payload::Generated { response } => ActionOutcome::Completed {
                    action: *self,
                    result: response,
                },
                other => ActionOutcome::Failed {
                    action: *self,
                    error: format!("unexpected response: {other:?}"),
                },
            },
            Err(error) => ActionOutcome::Failed {
                action: *self,
                error,
            },
        }
    }
}

impl fmt::Display for ContextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ContextAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summarize" => Ok(ContextAction::Summarize),
            "translate" => Ok(ContextAction::Translate),
            other => Err(Error::InvalidRequest(format!("unknown action '{other}'"))),
        }
    }
}

/// Severity of a toast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

/// A short transient status message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of running a context action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed { action: ContextAction, result: String },
    Failed { action: ContextAction, error: String },
}

impl ActionOutcome {
    /// Toast summarizing the outcome
    pub fn toast(&self) -> Toast {
        match self {
            ActionOutcome::Completed { action, .. } => {
                Toast::new(ToastKind::Success, format!("{} complete", action.result_title()))
            }
            ActionOutcome::Failed { action, .. } => {
                Toast::new(ToastKind::Error, format!("{} error", action.result_title()))
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Completed { .. })
    }
}
