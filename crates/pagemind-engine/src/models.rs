//! Model registry: the small chat models known to run well in a local engine.

use crate::{ChatTemplate, ModelSpec};

struct ModelEntry {
    id: &'static str,
    name: &'static str,
    template: ChatTemplate,
}

impl ModelEntry {
    fn to_spec(&self) -> ModelSpec {
        ModelSpec {
            id: self.id.to_string(),
            name: self.name.to_string(),
            template: self.template,
        }
    }
}

const MODEL_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        id: "stablelm2:1.6b-zephyr",
        name: "StableLM-2-Zephyr-1.6B",
        template: ChatTemplate::Zephyr,
    },
    ModelEntry {
        id: "qwen2.5:0.5b-instruct",
        name: "Qwen2.5-0.5B-Instruct",
        template: ChatTemplate::ChatMl,
    },
    ModelEntry {
        id: "tinyllama:1.1b-chat",
        name: "TinyLlama-1.1B-Chat",
        template: ChatTemplate::Zephyr,
    },
    ModelEntry {
        id: "phi3:mini",
        name: "Phi-3-Mini",
        template: ChatTemplate::Phi3,
    },
];

/// Id of the model loaded when nothing else is configured.
pub const DEFAULT_MODEL_ID: &str = "stablelm2:1.6b-zephyr";

/// Id of the smaller model tried when the default fails to load.
pub const DEFAULT_FALLBACK_ID: &str = "qwen2.5:0.5b-instruct";

/// Look up a model by engine id or display name (case-insensitive).
pub fn get_model(key: &str) -> Option<ModelSpec> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id.eq_ignore_ascii_case(key) || e.name.eq_ignore_ascii_case(key))
        .map(ModelEntry::to_spec)
}

/// Resolve a model, treating unknown ids as custom models with a plain template.
pub fn resolve_model(key: &str) -> ModelSpec {
    get_model(key).unwrap_or_else(|| {
        tracing::debug!("Model '{}' not in registry, using plain template", key);
        ModelSpec::custom(key, ChatTemplate::Plain)
    })
}

/// The default primary model.
pub fn default_model() -> ModelSpec {
    resolve_model(DEFAULT_MODEL_ID)
}

/// The default fallback model.
pub fn default_fallback() -> ModelSpec {
    resolve_model(DEFAULT_FALLBACK_ID)
}
