//! Core types for local model inference

use serde::{Deserialize, Serialize};

/// Conversational prompt format a model was fine-tuned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplate {
    /// `<|user|>` / `<|assistant|>` turns (StableLM Zephyr, TinyLlama)
    Zephyr,
    /// `<|im_start|>` / `<|im_end|>` turns (Qwen)
    ChatMl,
    /// `<|user|>` ... `<|end|>` turns (Phi-3)
    Phi3,
    /// Prompt passed through unchanged
    Plain,
}

impl ChatTemplate {
    /// Wrap a single user turn so the model answers as the assistant.
    pub fn format(&self, prompt: &str) -> String {
        match self {
            ChatTemplate::Zephyr => format!("<|user|>\n{prompt}\n<|assistant|>\n"),
            ChatTemplate::ChatMl => {
                format!("<|im_start|>user\n{prompt}<|im_end|>\n<|im_start|>assistant\n")
            }
            ChatTemplate::Phi3 => format!("<|user|>\n{prompt}<|end|>\n<|assistant|>\n"),
            ChatTemplate::Plain => prompt.to_string(),
        }
    }

    /// Special tokens a model may leak at the end of its reply.
    pub fn stop_markers(&self) -> &'static [&'static str] {
        match self {
            ChatTemplate::Zephyr => &["<|endoftext|>", "<|user|>"],
            ChatTemplate::ChatMl => &["<|im_end|>", "<|endoftext|>"],
            ChatTemplate::Phi3 => &["<|end|>", "<|endoftext|>"],
            ChatTemplate::Plain => &[],
        }
    }
}

/// A model the engine can load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Engine-side identifier (e.g., "stablelm2:1.6b-zephyr")
    pub id: String,
    /// Human-readable name reported to the UI
    pub name: String,
    /// Prompt template the model expects
    pub template: ChatTemplate,
}

impl ModelSpec {
    /// Create a spec for a model the registry does not know about
    pub fn custom(id: impl Into<String>, template: ChatTemplate) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            template,
        }
    }
}

/// Fixed sampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            repetition_penalty: 1.1,
        }
    }
}

/// Parameters for a single generation call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of new tokens to produce
    pub max_new_tokens: u32,
    /// Sampling configuration
    pub sampling: SamplingParams,
}

/// A progress report emitted by the engine while a model loads
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadProgress {
    /// Fraction complete in `0.0..=1.0`
    Fraction(f64),
    /// Bytes transferred so far out of a known total
    Bytes { loaded: u64, total: u64 },
}

impl LoadProgress {
    /// Rounded percentage in `0..=100`, if the report carries one.
    pub fn percent(&self) -> Option<u8> {
        let fraction = match *self {
            LoadProgress::Fraction(f) => f,
            LoadProgress::Bytes { total: 0, .. } => return None,
            LoadProgress::Bytes { loaded, total } => loaded as f64 / total as f64,
        };
        if !fraction.is_finite() {
            return None;
        }
        Some((fraction.clamp(0.0, 1.0) * 100.0).round() as u8)
    }
}
