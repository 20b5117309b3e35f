use crate::config::RetrievalConfig;
use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the retrieval service should assemble its candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    Semantic,
    Hybrid,
    Hierarchical,
}

/// A question posed to the retrieval oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalQuery {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub max_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_strategy: Option<RetrievalStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
}

impl RetrievalQuery {
    pub fn new(question: impl Into<String>, max_results: usize) -> Self {
        Self {
            question: question.into(),
            context: None,
            max_results,
            retrieval_strategy: None,
            filters: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_strategy(mut self, strategy: RetrievalStrategy) -> Self {
        self.retrieval_strategy = Some(strategy);
        self
    }

    pub fn with_filters(mut self, filters: Option<serde_json::Value>) -> Self {
        self.filters = filters;
        self
    }
}

/// A document backing a retrieval answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Source {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            score: None,
        }
    }
}

/// Answer returned by the retrieval oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retrieval {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub retrieval_metrics: Option<serde_json::Value>,
}

impl Retrieval {
    /// Source ids in ranking order.
    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }
}

/// Document-retrieval oracle.
#[async_trait]
pub trait RetrievalOracle: Send + Sync {
    async fn retrieve(&self, query: &RetrievalQuery) -> ConclaveResult<Retrieval>;
}

/// Retrieval oracle reached over HTTP: the query is POSTed as JSON and the
/// response body is decoded as a [`Retrieval`].
pub struct HttpRetrievalOracle {
    config: RetrievalConfig,
    http: reqwest::Client,
}

impl HttpRetrievalOracle {
    pub fn new(config: RetrievalConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RetrievalOracle for HttpRetrievalOracle {
    async fn retrieve(&self, query: &RetrievalQuery) -> ConclaveResult<Retrieval> {
        debug!(max_results = query.max_results, "retrieval query");

        let mut request = self.http.post(&self.config.endpoint).json(query);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ConclaveError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConclaveError::Http(format!(
                "Retrieval service error {status}: {body}"
            )));
        }

        resp.json::<Retrieval>()
            .await
            .map_err(|e| ConclaveError::Oracle(format!("Malformed retrieval response: {e}")))
    }
}
