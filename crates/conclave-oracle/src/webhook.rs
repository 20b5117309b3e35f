use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use serde_json::Value;
use tracing::debug;

/// Outbound webhook: POST a JSON body, get a JSON body back.
///
/// Callers treat failures as non-fatal; implementations just report them.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn post(&self, body: &Value) -> ConclaveResult<Value>;
}

/// [`WebhookNotifier`] posting to a fixed URL.
pub struct HttpWebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl HttpWebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn post(&self, body: &Value) -> ConclaveResult<Value> {
        debug!(url = %self.url, "webhook POST");

        let resp = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ConclaveError::Notifier(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ConclaveError::Notifier(e.to_string()))?;

        if !status.is_success() {
            return Err(ConclaveError::Notifier(format!(
                "webhook returned {status}: {text}"
            )));
        }

        // An empty acknowledgement is a valid reply.
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ConclaveError::Notifier(format!("webhook replied with non-JSON body: {e}")))
    }
}
