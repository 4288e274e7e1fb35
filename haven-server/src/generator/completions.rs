//! OpenAI-compatible text completions backend.
//!
//! Speaks `POST /v1/completions`, which llama.cpp server, vLLM and TGI all
//! expose for plain causal models without a chat template.

use super::{GenerationError, GenerationParams, TextGenerator};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const BACKEND: &str = "completions";

/// Generator backed by an OpenAI-compatible completions endpoint.
pub struct CompletionsGenerator {
    base_url: String,
    model: String,
    api_key: Option<String>,
    params: GenerationParams,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: Option<i64>,
    #[serde(default)]
    completion_tokens: Option<i64>,
}

impl CompletionsGenerator {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        params: GenerationParams,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(ToString::to_string),
            params,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn request_error(e: reqwest::Error) -> GenerationError {
        GenerationError::Request {
            backend: BACKEND.into(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for CompletionsGenerator {
    fn name(&self) -> &str {
        BACKEND
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> Result<(), GenerationError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(Self::request_error)?;

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
        let url = format!("{}/v1/completions", self.base_url);

        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: self.params.max_new_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
        };

        let response = self
            .authorize(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                backend: BACKEND.into(),
                status: status.as_u16(),
                body,
            });
        }

        let result: CompletionResponse =
            response.json().await.map_err(|e| GenerationError::Decode {
                backend: BACKEND.into(),
                message: e.to_string(),
            })?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Empty {
                backend: BACKEND.into(),
            })?;

        let usage = result.usage.as_ref();
        tracing::debug!(
            model = %self.model,
            input_tokens = usage.and_then(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens = usage.and_then(|u| u.completion_tokens).unwrap_or(0),
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            latency_ms = start.elapsed().as_millis() as u64,
            "Generation completed"
        );

        Ok(choice.text)
    }
}
