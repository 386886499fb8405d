//! Request/response messages exchanged between contexts.
//!
//! Wire shapes follow the extension message catalogue: requests are objects
//! tagged by `type`, responses are `{success: true, ...result}` or
//! `{success: false, error}`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default token budget for free-form generation
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Token budget for summarize/translate requests
pub const TASK_MAX_TOKENS: u32 = 256;

/// A request sent to another context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Start loading the model if it is not loading or loaded
    LoadModel,
    /// Snapshot of the model lifecycle
    GetModelStatus,
    /// Free-form generation
    GenerateText {
        prompt: String,
        #[serde(
            rename = "maxTokens",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        max_tokens: Option<u32>,
    },
    /// Summarize text with the summarization template
    SummarizeText { text: String },
    /// Translate text with the translation template
    TranslateText { text: String },
    /// Main readable text of the page
    GetPageContent,
    /// Current text selection of the page
    GetSelection,
}

/// Every request type tag, in catalogue order
pub const REQUEST_TYPES: &[&str] = &[
    "LOAD_MODEL",
    "GET_MODEL_STATUS",
    "GENERATE_TEXT",
    "SUMMARIZE_TEXT",
    "TRANSLATE_TEXT",
    "GET_PAGE_CONTENT",
    "GET_SELECTION",
];

impl Request {
    /// The wire `type` tag of this request
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::LoadModel => "LOAD_MODEL",
            Request::GetModelStatus => "GET_MODEL_STATUS",
            Request::GenerateText { .. } => "GENERATE_TEXT",
            Request::SummarizeText { .. } => "SUMMARIZE_TEXT",
            Request::TranslateText { .. } => "TRANSLATE_TEXT",
            Request::GetPageContent => "GET_PAGE_CONTENT",
            Request::GetSelection => "GET_SELECTION",
        }
    }

    /// Decode a request from an untyped JSON message.
    ///
    /// Unrecognized `type` tags map to [`Error::UnknownRequestType`]; a known
    /// tag with a malformed payload maps to [`Error::InvalidRequest`].
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let type_name = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::UnknownRequestType("<missing>".to_string()))?;

        if !REQUEST_TYPES.contains(&type_name.as_str()) {
            return Err(Error::UnknownRequestType(type_name));
        }

        serde_json::from_value(value).map_err(|e| Error::InvalidRequest(format!("{type_name}: {e}")))
    }
}

/// Successful response bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Reply to `LOAD_MODEL`
    LoadState {
        ready: bool,
        loading: bool,
        progress: u8,
    },
    /// Reply to `GET_MODEL_STATUS`
    #[serde(rename_all = "camelCase")]
    ModelStatus {
        is_loading: bool,
        is_ready: bool,
        model_name: String,
        progress: u8,
    },
    /// Reply to the generation requests
    Generated { response: String },
    /// Reply to `GET_PAGE_CONTENT`
    PageContent { content: String },
    /// Reply to `GET_SELECTION`
    #[serde(rename_all = "camelCase")]
    Selection { text: String, has_selection: bool },
}

/// A response to exactly one [`Request`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// A successful response
    pub fn ok(payload: Payload) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// A failure response carrying the error's message
    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.to_string()),
        }
    }

    /// The error message if this is a failure
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.error.as_deref().unwrap_or("Unknown error"))
        }
    }

    /// Split into the payload or the error message
    pub fn into_result(self) -> std::result::Result<Payload, String> {
        match (self.success, self.payload) {
            (true, Some(payload)) => Ok(payload),
            (true, None) => Err("Empty response".to_string()),
            (false, _) => Err(self.error.unwrap_or_else(|| "Unknown error".to_string())),
        }
    }

    /// Generated text of a successful generation response
    pub fn generated_text(&self) -> Option<&str> {
        match &self.payload {
            Some(Payload::Generated { response }) if self.success => Some(response),
            _ => None,
        }
    }
}

impl From<Result<Payload>> for Response {
    fn from(result: Result<Payload>) -> Self {
        match result {
            Ok(payload) => Response::ok(payload),
            Err(e) => Response::failure(&e),
        }
    }
}
