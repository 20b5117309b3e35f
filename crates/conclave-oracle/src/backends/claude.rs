use crate::completion::{Completion, CompletionOptions, CompletionOracle, Usage};
use crate::config::ModelConfig;
use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use tracing::debug;

/// Claude (Anthropic) messages API backend.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionOracle for ClaudeBackend {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> ConclaveResult<Completion> {
        let url = format!("{}/v1/messages", self.config.base_url());

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": options.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": options.temperature.unwrap_or(self.config.temperature),
            "messages": [{"role": "user", "content": prompt}],
        });

        debug!(model = %self.config.model_id, complexity = ?options.complexity, "Claude completion");

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
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
                "Claude API error {status}: {resp_body}"
            )));
        }

        parse_claude_response(&resp_body)
    }
}

/// Extract text, model and usage from a Claude messages response.
pub fn parse_claude_response(body: &serde_json::Value) -> ConclaveResult<Completion> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| ConclaveError::Oracle("Missing content in Claude response".into()))?;

    let text = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let usage = body.get("usage").map(|u| {
        let prompt_tokens = u["input_tokens"].as_u64().unwrap_or(0);
        let completion_tokens = u["output_tokens"].as_u64().unwrap_or(0);
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    });

    Ok(Completion {
        text,
        model: body["model"].as_str().unwrap_or_default().to_string(),
        confidence: None,
        usage,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_text_blocks() {
        let body = json!({
            "model": "claude-sonnet-4",
            "content": [
                {"type": "text", "text": "Article 8"},
                {"type": "tool_use", "id": "x", "name": "n", "input": {}},
                {"type": "text", "text": "applies."}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 30}
        });
        let completion = parse_claude_response(&body).unwrap();
        assert_eq!(completion.text, "Article 8\napplies.");
        assert_eq!(completion.model, "claude-sonnet-4");
        assert_eq!(completion.tokens_used(), 42);
    }

    #[test]
    fn test_parse_missing_content() {
        let err = parse_claude_response(&json!({"error": "overloaded"})).unwrap_err();
        assert!(err.to_string().contains("Missing content"));
    }
}
