use crate::backends::claude::ClaudeBackend;
use crate::backends::openai::OpenAiBackend;
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use conclave_core::ConclaveResult;
use serde::{Deserialize, Serialize};

/// How demanding a prompt is. Backends may use it to pick defaults; the HTTP
/// backends shipped here only forward it in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

/// Per-call knobs for a completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub complexity: Complexity,
    /// Overrides the backend's configured temperature.
    pub temperature: Option<f32>,
    /// Overrides the backend's configured token limit.
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn new(complexity: Complexity) -> Self {
        Self {
            complexity,
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Result of a completion call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    /// Model that produced the text, as reported by the provider.
    pub model: String,
    pub confidence: Option<f64>,
    pub usage: Option<Usage>,
}

impl Completion {
    /// Total tokens used, or zero when the provider reported none.
    pub fn tokens_used(&self) -> u64 {
        self.usage.map(|u| u.total_tokens).unwrap_or(0)
    }
}

/// Text-completion oracle.
///
/// Implementations may fail or time out; callers own any retry policy.
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> ConclaveResult<Completion>;
}

/// Build the HTTP completion backend matching `config.provider`.
pub fn completion_oracle(config: ModelConfig) -> Box<dyn CompletionOracle> {
    match config.provider {
        LlmProvider::Claude => Box::new(ClaudeBackend::new(config)),
        LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Groq => {
            Box::new(OpenAiBackend::new(config))
        }
    }
}
