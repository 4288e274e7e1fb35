//! Text-generation backends.
//!
//! The language model runs out of process; Haven talks to it over HTTP through
//! the [`TextGenerator`] trait. Two wire formats are supported:
//! Ollama's `/api/generate` and the OpenAI-compatible `/v1/completions`
//! endpoint exposed by llama.cpp server, vLLM and TGI.

mod completions;
mod ollama;

pub use completions::CompletionsGenerator;
pub use ollama::OllamaGenerator;

use async_trait::async_trait;
use haven_common::config::{ModelBackend, ModelConfig};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Generator Trait
// ============================================================================

/// A loaded language model that continues a text prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Backend name, used in logs and errors.
    fn name(&self) -> &str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Whether `generate` returns the prompt followed by the continuation
    /// rather than the continuation alone.
    fn echoes_prompt(&self) -> bool {
        false
    }

    /// Check that the backend is reachable and serves the model.
    async fn probe(&self) -> Result<(), GenerationError>;

    /// Generate a continuation of `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Error from a generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("[{backend}] request failed: {message}")]
    Request { backend: String, message: String },

    #[error("[{backend}] API error ({status}): {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("[{backend}] failed to parse response: {message}")]
    Decode { backend: String, message: String },

    #[error("[{backend}] generation timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    #[error("[{backend}] response contained no text")]
    Empty { backend: String },
}

// ============================================================================
// Sampling Parameters
// ============================================================================

/// Sampling settings sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

impl From<&ModelConfig> for GenerationParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Build the configured backend without contacting it.
pub fn create_generator(config: &ModelConfig) -> Arc<dyn TextGenerator> {
    let params = GenerationParams::from(config);
    match config.backend {
        ModelBackend::Ollama => Arc::new(OllamaGenerator::new(
            Some(config.base_url()),
            &config.model,
            params,
        )),
        ModelBackend::Completions => Arc::new(CompletionsGenerator::new(
            config.base_url(),
            &config.model,
            config.api_key.as_deref(),
            params,
        )),
    }
}

/// Build the configured backend and check that it answers.
///
/// Returns `None` when the backend is unreachable or does not serve the
/// model; the server keeps running and reports the model as not loaded.
pub async fn load_generator(config: &ModelConfig) -> Option<Arc<dyn TextGenerator>> {
    let generator = create_generator(config);

    tracing::info!(
        backend = generator.name(),
        model = generator.model(),
        base_url = config.base_url(),
        "Loading model"
    );

    match generator.probe().await {
        Ok(()) => {
            tracing::info!(model = generator.model(), "Model loaded successfully");
            Some(generator)
        }
        Err(e) => {
            tracing::error!(error = %e, "Error loading model");
            None
        }
    }
}
