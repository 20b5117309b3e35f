//! Per-task-type execution against the completion and retrieval oracles.

use crate::types::{Agent, Task, TaskKind, TaskOutput};
use chrono::{Duration, Utc};
use conclave_core::{ConclaveError, ConclaveResult};
use conclave_oracle::{
    Completion, CompletionOptions, CompletionOracle, Complexity, Retrieval, RetrievalOracle,
    RetrievalQuery, RetrievalStrategy,
};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Confidence reported when a validation response carries no parsable score.
pub const DEFAULT_VALIDATION_SCORE: f64 = 0.8;

/// Look-back window for monitoring tasks without a `since` parameter.
const MONITORING_WINDOW_DAYS: i64 = 30;

/// Runs a task on behalf of an agent.
pub struct TaskExecutor {
    completion: Arc<dyn CompletionOracle>,
    retrieval: Arc<dyn RetrievalOracle>,
}

impl TaskExecutor {
    pub fn new(completion: Arc<dyn CompletionOracle>, retrieval: Arc<dyn RetrievalOracle>) -> Self {
        Self {
            completion,
            retrieval,
        }
    }

    /// Dispatch on the task kind. Oracle failures surface as
    /// [`ConclaveError::Execution`].
    pub async fn execute(&self, agent: &Agent, task: &Task) -> ConclaveResult<TaskOutput> {
        debug!(task_id = %task.id, agent_id = %agent.id, kind = %task.kind, "executing task");
        let result = match task.kind {
            TaskKind::Analysis => self.analysis(agent, task).await,
            TaskKind::Research => self.research(agent, task).await,
            TaskKind::Validation => self.validation(agent, task).await,
            TaskKind::Synthesis => self.synthesis(agent, task).await,
            TaskKind::Monitoring => self.monitoring(agent, task).await,
        };
        result.map_err(|e| match e {
            ConclaveError::Execution(_) => e,
            other => ConclaveError::Execution(other.to_string()),
        })
    }

    async fn complete(
        &self,
        agent: &Agent,
        prompt: &str,
        complexity: Complexity,
    ) -> ConclaveResult<Completion> {
        let options = CompletionOptions::new(complexity)
            .with_temperature(agent.config.temperature)
            .with_max_tokens(agent.config.max_tokens);
        self.completion.complete(prompt, &options).await
    }

    async fn analysis(&self, agent: &Agent, task: &Task) -> ConclaveResult<TaskOutput> {
        let prompt = format!(
            "You are {name}, a {description}.\n\n\
             Task: {query}\n\
             Context: {context}\n\n\
             Provide a comprehensive analysis focusing on:\n\
             1. Key regulatory requirements\n\
             2. Compliance implications\n\
             3. Risk assessment\n\
             4. Recommended actions\n\n\
             Analysis:",
            name = agent.name,
            description = agent.metadata.description,
            query = task.input.query,
            context = task.input.context.as_deref().unwrap_or("None provided"),
        );
        let completion = self.complete(agent, &prompt, Complexity::High).await?;

        let query = RetrievalQuery::new(&task.input.query, 5)
            .with_context(task.input.context.clone())
            .with_strategy(RetrievalStrategy::Hybrid);
        let retrieval = self.retrieval.retrieve(&query).await?;

        Ok(TaskOutput {
            confidence: retrieval.confidence,
            sources: retrieval.source_ids(),
            reasoning: retrieval.reasoning.clone().unwrap_or_default(),
            metadata: json!({
                "agentId": agent.id,
                "model": completion.model,
                "tokensUsed": completion.tokens_used(),
                "supportingDocuments": retrieval.sources.len(),
            }),
            result: completion.text,
        })
    }

    async fn research(&self, agent: &Agent, task: &Task) -> ConclaveResult<TaskOutput> {
        let query = RetrievalQuery::new(&task.input.query, 10)
            .with_context(task.input.context.clone())
            .with_strategy(RetrievalStrategy::Hierarchical)
            .with_filters(task.parameter("filters").cloned());
        let retrieval = self.retrieval.retrieve(&query).await?;

        let prompt = format!(
            "You are {name}. Synthesize the following research findings:\n\n\
             Query: {query}\n\
             Findings: {findings}\n\n\
             Provide:\n\
             1. Executive summary\n\
             2. Key findings\n\
             3. Regulatory implications\n\
             4. Recommendations\n\n\
             Research Summary:",
            name = agent.name,
            query = task.input.query,
            findings = retrieval.answer,
        );
        let completion = self.complete(agent, &prompt, Complexity::High).await?;

        Ok(TaskOutput {
            result: completion.text,
            confidence: retrieval.confidence,
            sources: retrieval.source_ids(),
            reasoning: "Comprehensive research using RAG and synthesis".to_string(),
            metadata: json!({
                "agentId": agent.id,
                "documentsAnalyzed": retrieval.sources.len(),
                "retrievalMetrics": retrieval.retrieval_metrics,
            }),
        })
    }

    async fn validation(&self, agent: &Agent, task: &Task) -> ConclaveResult<TaskOutput> {
        let sources = match task.parameter("sources").and_then(Value::as_array) {
            Some(list) if !list.is_empty() => list.iter().map(display).collect::<Vec<_>>().join(", "),
            _ => "None".to_string(),
        };
        let prompt = format!(
            "You are {name}, responsible for validating compliance analysis results.\n\n\
             Original Query: {query}\n\
             Result to Validate: {result}\n\
             Sources: {sources}\n\n\
             Validate this result by checking:\n\
             1. Accuracy of regulatory interpretation\n\
             2. Completeness of analysis\n\
             3. Source reliability\n\
             4. Logical consistency\n\n\
             Provide validation score (0-1) and detailed feedback:\n\n\
             Validation:",
            name = agent.name,
            query = task.input.query,
            result = task.parameter("resultToValidate").map(display).unwrap_or_default(),
        );
        let completion = self.complete(agent, &prompt, Complexity::Medium).await?;

        let score = extract_validation_score(&completion.text).unwrap_or_else(|| {
            warn!(task_id = %task.id, "no validation score in response, using default");
            DEFAULT_VALIDATION_SCORE
        });

        Ok(TaskOutput {
            result: completion.text,
            confidence: score,
            sources: Vec::new(),
            reasoning: "Expert validation analysis".to_string(),
            metadata: json!({
                "agentId": agent.id,
                "validationScore": score,
                "validationType": "expert_review",
            }),
        })
    }

    async fn synthesis(&self, agent: &Agent, task: &Task) -> ConclaveResult<TaskOutput> {
        let inputs: &[Value] = task
            .parameter("inputs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let listing = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let text = non_empty(input.get("summary"))
                    .or_else(|| non_empty(input.get("result")))
                    .map(display)
                    .unwrap_or_default();
                format!("{}. {text}", i + 1)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "You are {name}, coordinating multiple analysis results.\n\n\
             Objective: {query}\n\
             Inputs to synthesize:\n{listing}\n\n\
             Provide:\n\
             1. Integrated analysis\n\
             2. Consensus findings\n\
             3. Conflicting viewpoints\n\
             4. Final recommendations\n\n\
             Synthesis:",
            name = agent.name,
            query = task.input.query,
        );
        let completion = self.complete(agent, &prompt, Complexity::High).await?;

        // Concatenated in input order; a source cited by several inputs repeats.
        let sources: Vec<String> = inputs
            .iter()
            .filter_map(|input| input.get("sources").and_then(Value::as_array))
            .flatten()
            .map(display)
            .collect();

        Ok(TaskOutput {
            result: completion.text,
            confidence: 0.9,
            sources,
            reasoning: "Multi-agent synthesis and coordination".to_string(),
            metadata: json!({
                "agentId": agent.id,
                "inputCount": inputs.len(),
                "synthesisType": "multi_agent_coordination",
            }),
        })
    }

    async fn monitoring(&self, agent: &Agent, task: &Task) -> ConclaveResult<TaskOutput> {
        let now = Utc::now();
        let since = task.parameter("since").and_then(Value::as_str);
        let start = since.map(str::to_string).unwrap_or_else(|| {
            (now - Duration::days(MONITORING_WINDOW_DAYS)).to_rfc3339()
        });

        let query = RetrievalQuery::new(
            format!("Monitor for changes related to: {}", task.input.query),
            20,
        )
        .with_filters(Some(json!({
            "dateRange": {"start": start, "end": now.to_rfc3339()}
        })));
        let retrieval = self.retrieval.retrieve(&query).await?;

        let prompt = format!(
            "You are {name}, monitoring regulatory changes.\n\n\
             Monitoring Query: {query}\n\
             Recent Updates Found: {updates}\n\n\
             Analyze:\n\
             1. Significant changes detected\n\
             2. Impact assessment\n\
             3. Required actions\n\
             4. Monitoring recommendations\n\n\
             Monitoring Report:",
            name = agent.name,
            query = task.input.query,
            updates = retrieval.answer,
        );
        let completion = self.complete(agent, &prompt, Complexity::Medium).await?;

        Ok(monitoring_output(agent, since, completion, retrieval))
    }
}

fn monitoring_output(
    agent: &Agent,
    since: Option<&str>,
    completion: Completion,
    retrieval: Retrieval,
) -> TaskOutput {
    TaskOutput {
        result: completion.text,
        confidence: retrieval.confidence,
        sources: retrieval.source_ids(),
        reasoning: "Automated regulatory change monitoring".to_string(),
        metadata: json!({
            "agentId": agent.id,
            "changesDetected": retrieval.sources.len(),
            "monitoringPeriod": since.unwrap_or("30 days"),
        }),
    }
}

/// First number following the word `score` (any case), e.g. `Score: 0.85`.
pub fn extract_validation_score(text: &str) -> Option<f64> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"(?i)score[:\s]*(\d*\.?\d+)").ok())
        .as_ref()?;
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn non_empty(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::profiles::default_agents;
    use crate::types::TaskSubmission;
    use async_trait::async_trait;
    use conclave_oracle::{Source, Usage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCompletion {
        reply: String,
        prompts: Mutex<Vec<(String, CompletionOptions)>>,
    }

    #[async_trait]
    impl CompletionOracle for RecordingCompletion {
        async fn complete(
            &self,
            prompt: &str,
            options: &CompletionOptions,
        ) -> ConclaveResult<Completion> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), options.clone()));
            Ok(Completion {
                text: self.reply.clone(),
                model: "mock-model".into(),
                confidence: None,
                usage: Some(Usage {
                    prompt_tokens: 3,
                    completion_tokens: 4,
                    total_tokens: 7,
                }),
            })
        }
    }

    #[derive(Default)]
    struct RecordingRetrieval {
        queries: Mutex<Vec<RetrievalQuery>>,
    }

    #[async_trait]
    impl RetrievalOracle for RecordingRetrieval {
        async fn retrieve(&self, query: &RetrievalQuery) -> ConclaveResult<Retrieval> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(Retrieval {
                answer: "two relevant documents".into(),
                sources: vec![Source::new("doc-a"), Source::new("doc-b")],
                confidence: 0.77,
                reasoning: Some("matched on article".into()),
                retrieval_metrics: Some(json!({"latencyMs": 12})),
            })
        }
    }

    struct FailingRetrieval;

    #[async_trait]
    impl RetrievalOracle for FailingRetrieval {
        async fn retrieve(&self, _: &RetrievalQuery) -> ConclaveResult<Retrieval> {
            Err(ConclaveError::Http("connection refused".into()))
        }
    }

    fn agent(id: &str) -> Agent {
        default_agents()
            .into_iter()
            .find(|a| a.id.as_str() == id)
            .unwrap()
    }

    fn setup(reply: &str) -> (TaskExecutor, Arc<RecordingCompletion>, Arc<RecordingRetrieval>) {
        let completion = Arc::new(RecordingCompletion {
            reply: reply.into(),
            ..Default::default()
        });
        let retrieval = Arc::new(RecordingRetrieval::default());
        (
            TaskExecutor::new(completion.clone(), retrieval.clone()),
            completion,
            retrieval,
        )
    }

    #[test]
    fn test_extract_validation_score() {
        assert_eq!(extract_validation_score("Validation score: 0.92"), Some(0.92));
        assert_eq!(extract_validation_score("SCORE .5 overall"), Some(0.5));
        assert_eq!(extract_validation_score("score:\n  1"), Some(1.0));
        assert_eq!(extract_validation_score("looks fine"), None);
    }

    #[tokio::test]
    async fn test_research_uses_hierarchical_retrieval() {
        let (executor, completion, retrieval) = setup("summary");
        let researcher = agent("regulatory-researcher");
        let task = Task::from_submission(
            TaskSubmission::new(TaskKind::Research, "Article 9 funds")
                .with_parameter("filters", json!({"jurisdiction": "EU"})),
        );

        let output = executor.execute(&researcher, &task).await.unwrap();
        assert_eq!(output.result, "summary");
        assert_eq!(output.sources, vec!["doc-a", "doc-b"]);
        assert!((output.confidence - 0.77).abs() < 1e-9);
        assert_eq!(output.metadata["documentsAnalyzed"], 2);

        let queries = retrieval.queries.lock().unwrap();
        assert_eq!(queries[0].max_results, 10);
        assert_eq!(queries[0].retrieval_strategy, Some(RetrievalStrategy::Hierarchical));
        assert_eq!(queries[0].filters.as_ref().unwrap()["jurisdiction"], "EU");

        let prompts = completion.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("two relevant documents"));
        assert_eq!(prompts[0].1.temperature, Some(researcher.config.temperature));
        assert_eq!(prompts[0].1.max_tokens, Some(2500));
    }

    #[tokio::test]
    async fn test_analysis_completion_then_retrieval() {
        let (executor, completion, retrieval) = setup("analysis text");
        let analyst = agent("sfdr-specialist");
        let task = Task::from_submission(TaskSubmission::new(TaskKind::Analysis, "Fund X"));

        let output = executor.execute(&analyst, &task).await.unwrap();
        assert_eq!(output.reasoning, "matched on article");
        assert_eq!(output.metadata["tokensUsed"], 7);
        assert_eq!(output.metadata["model"], "mock-model");
        assert_eq!(output.metadata["supportingDocuments"], 2);
        assert_eq!(completion.prompts.lock().unwrap()[0].1.complexity, Complexity::High);
        assert!(completion.prompts.lock().unwrap()[0].0.contains("None provided"));
        assert_eq!(retrieval.queries.lock().unwrap()[0].max_results, 5);
    }

    #[tokio::test]
    async fn test_validation_parses_score() {
        let (executor, _completion, _retrieval) = setup("Overall Score: 0.65. Minor gaps.");
        let task = Task::from_submission(
            TaskSubmission::new(TaskKind::Validation, "check")
                .with_parameter("resultToValidate", json!("Fund X is Article 8"))
                .with_parameter("sources", json!(["doc-a"])),
        );
        let output = executor
            .execute(&agent("validation-agent"), &task)
            .await
            .unwrap();
        assert!((output.confidence - 0.65).abs() < 1e-9);
        assert!(output.sources.is_empty());
        assert_eq!(output.metadata["validationType"], "expert_review");
    }

    #[tokio::test]
    async fn test_validation_defaults_score() {
        let (executor, _completion, _retrieval) = setup("Looks plausible.");
        let task = Task::from_submission(TaskSubmission::new(TaskKind::Validation, "check"));
        let output = executor
            .execute(&agent("validation-agent"), &task)
            .await
            .unwrap();
        assert_eq!(output.confidence, DEFAULT_VALIDATION_SCORE);
        assert_eq!(output.metadata["validationScore"], DEFAULT_VALIDATION_SCORE);
    }

    #[tokio::test]
    async fn test_synthesis_merges_input_sources() {
        let (executor, completion, retrieval) = setup("integrated");
        let task = Task::from_submission(
            TaskSubmission::new(TaskKind::Synthesis, "combine").with_parameter(
                "inputs",
                json!([
                    {"summary": "first finding", "sources": ["s1", "s2"]},
                    {"result": "second finding", "sources": ["s2", "s3"]}
                ]),
            ),
        );
        let output = executor
            .execute(&agent("compliance-coordinator"), &task)
            .await
            .unwrap();
        assert_eq!(output.confidence, 0.9);
        assert_eq!(output.sources, vec!["s1", "s2", "s2", "s3"]);
        assert_eq!(output.metadata["inputCount"], 2);
        let prompt = &completion.prompts.lock().unwrap()[0].0;
        assert!(prompt.contains("1. first finding"));
        assert!(prompt.contains("2. second finding"));
        assert!(retrieval.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_monitoring_date_range() {
        let (executor, _completion, retrieval) = setup("report");
        let task = Task::from_submission(
            TaskSubmission::new(TaskKind::Monitoring, "DORA")
                .with_parameter("since", json!("2026-01-01T00:00:00Z")),
        );
        let output = executor
            .execute(&agent("regulatory-researcher"), &task)
            .await
            .unwrap();
        assert_eq!(output.metadata["monitoringPeriod"], "2026-01-01T00:00:00Z");
        assert_eq!(output.metadata["changesDetected"], 2);

        let queries = retrieval.queries.lock().unwrap();
        assert_eq!(queries[0].max_results, 20);
        assert_eq!(queries[0].question, "Monitor for changes related to: DORA");
        let range = &queries[0].filters.as_ref().unwrap()["dateRange"];
        assert_eq!(range["start"], "2026-01-01T00:00:00Z");
        assert!(range["end"].is_string());
    }

    #[tokio::test]
    async fn test_monitoring_default_period() {
        let (executor, _completion, _retrieval) = setup("report");
        let task = Task::from_submission(TaskSubmission::new(TaskKind::Monitoring, "DORA"));
        let output = executor
            .execute(&agent("regulatory-researcher"), &task)
            .await
            .unwrap();
        assert_eq!(output.metadata["monitoringPeriod"], "30 days");
    }

    #[tokio::test]
    async fn test_oracle_failure_is_execution_error() {
        let completion = Arc::new(RecordingCompletion::default());
        let executor = TaskExecutor::new(completion, Arc::new(FailingRetrieval));
        let task = Task::from_submission(TaskSubmission::new(TaskKind::Research, "q"));
        let err = executor
            .execute(&agent("regulatory-researcher"), &task)
            .await
            .unwrap_err();
        assert!(matches!(err, ConclaveError::Execution(ref m) if m.contains("connection refused")));
    }
}
