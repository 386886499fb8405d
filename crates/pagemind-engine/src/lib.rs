//! pagemind-engine: Local inference engine abstraction
//!
//! This crate defines the interface to a locally-run text generation engine,
//! the registry of small chat models and their prompt templates, and an
//! adapter for Ollama-compatible runtimes.

pub mod error;
pub mod models;
pub mod progress;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use progress::ProgressReporter;
pub use providers::{Generator, InferenceEngine};
pub use types::*;
