//! Ollama backend.
//!
//! Uses `/api/generate` in raw mode so the model sees the transcript exactly
//! as built, without Ollama applying its own chat template.

use super::{GenerationError, GenerationParams, TextGenerator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const BACKEND: &str = "ollama";

/// Generator backed by a local or remote Ollama server.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    params: GenerationParams,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    raw: bool,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<i64>,
    #[serde(default)]
    eval_count: Option<i64>,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

impl OllamaGenerator {
    /// Create a new Ollama generator.
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (defaults to http://localhost:11434)
    /// * `model` - Model name as known to Ollama
    pub fn new(base_url: Option<&str>, model: &str, params: GenerationParams) -> Self {
        Self {
            base_url: base_url
                .unwrap_or("http://localhost:11434")
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            params,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn request_error(&self, e: reqwest::Error) -> GenerationError {
        GenerationError::Request {
            backend: BACKEND.into(),
            message: format!("{e}. Is Ollama running at {}?", self.base_url),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        BACKEND
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> Result<(), GenerationError> {
        let url = format!("{}/api/show", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ShowRequest { model: &self.model })
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                backend: BACKEND.into(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let start = Instant::now();
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            raw: true,
            stream: false,
            options: GenerateOptions {
                temperature: self.params.temperature,
                top_p: self.params.top_p,
                num_predict: self.params.max_new_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                backend: BACKEND.into(),
                status: status.as_u16(),
                body,
            });
        }

        let result: GenerateResponse =
            response.json().await.map_err(|e| GenerationError::Decode {
                backend: BACKEND.into(),
                message: e.to_string(),
            })?;

        tracing::debug!(
            model = %self.model,
            input_tokens = result.prompt_eval_count.unwrap_or(0),
            output_tokens = result.eval_count.unwrap_or(0),
            finish_reason = result.done_reason.as_deref().unwrap_or("unknown"),
            latency_ms = start.elapsed().as_millis() as u64,
            "Generation completed"
        );

        Ok(result.response)
    }
}
