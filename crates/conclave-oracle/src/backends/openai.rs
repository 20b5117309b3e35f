use crate::completion::{Completion, CompletionOptions, CompletionOracle, Usage};
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use tracing::debug;

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request
                .header("HTTP-Referer", "https://github.com/conclave-rs/conclave")
                .header("X-Title", "Conclave")
        } else {
            request
        }
    }
}

#[async_trait]
impl CompletionOracle for OpenAiBackend {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> ConclaveResult<Completion> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": options.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": options.temperature.unwrap_or(self.config.temperature),
            "messages": [{"role": "user", "content": prompt}],
        });

        debug!(model = %self.config.model_id, complexity = ?options.complexity, "OpenAI completion");

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConclaveError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ConclaveError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(ConclaveError::Http(format!(
                "OpenAI API error {status}: {resp_body}"
            )));
        }

        parse_openai_response(&resp_body)
    }
}

/// Extract the first choice's text, the model and usage.
pub fn parse_openai_response(body: &serde_json::Value) -> ConclaveResult<Completion> {
    let message = body["choices"][0]
        .get("message")
        .ok_or_else(|| ConclaveError::Oracle("Missing choices in OpenAI response".into()))?;

    let usage = body.get("usage").map(|u| Usage {
        prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
    });

    Ok(Completion {
        text: message["content"].as_str().unwrap_or_default().to_string(),
        model: body["model"].as_str().unwrap_or_default().to_string(),
        confidence: None,
        usage,
    })
}
