//! End-to-end orchestration tests.
//!
//! Drives the full [`Orchestrator`] with scripted oracles: capability matching,
//! bounded task retry, single-flight queue draining, workflow traversal with
//! retry and fallback, webhook steps, collaboration fan-out and the audit trail.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult, Event};
use conclave_oracle::{
    Completion, CompletionOptions, CompletionOracle, Retrieval, RetrievalOracle, RetrievalQuery,
    Source, WebhookNotifier,
};
use conclave_orchestrator::types::{ErrorHandling, WorkflowKind, WorkflowStatus};
use conclave_orchestrator::*;
use conclave_store::{DurableStore, FileStore, MemoryStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Scripted oracles
// ---------------------------------------------------------------------------

/// Completion oracle that records prompts and tracks how many calls overlap.
#[derive(Default)]
struct ScriptedCompletion {
    prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Calls whose prompt contains this marker fail.
    fail_marker: Option<String>,
}

impl ScriptedCompletion {
    fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl CompletionOracle for ScriptedCompletion {
    async fn complete(&self, prompt: &str, _: &CompletionOptions) -> ConclaveResult<Completion> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.prompts.lock().await.push(prompt.to_string());

        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker {
            if prompt.contains(marker.as_str()) {
                return Err(ConclaveError::Oracle("model overloaded".into()));
            }
        }
        Ok(Completion {
            text: "Validation score: 0.91. Findings are consistent.".into(),
            model: "scripted-model".into(),
            confidence: None,
            usage: None,
        })
    }
}

struct ScriptedRetrieval;

#[async_trait]
impl RetrievalOracle for ScriptedRetrieval {
    async fn retrieve(&self, _: &RetrievalQuery) -> ConclaveResult<Retrieval> {
        Ok(Retrieval {
            answer: "Article 8 products promote environmental characteristics.".into(),
            sources: vec![Source::new("sfdr-l1-art8"), Source::new("sfdr-rts-annex2")],
            confidence: 0.86,
            reasoning: Some("Matched level 1 and RTS text".into()),
            retrieval_metrics: None,
        })
    }
}

/// Webhook notifier that records bodies; fails when `fail` is set.
#[derive(Default)]
struct RecordingNotifier {
    bodies: Mutex<Vec<Value>>,
    fail: bool,
}

#[async_trait]
impl WebhookNotifier for RecordingNotifier {
    async fn post(&self, body: &Value) -> ConclaveResult<Value> {
        self.bodies.lock().await.push(body.clone());
        if self.fail {
            return Err(ConclaveError::Notifier("webhook returned 503".into()));
        }
        Ok(json!({"received": true}))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        step_retry_delay_ms: 5,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator_with(completion: Arc<ScriptedCompletion>) -> Orchestrator {
    Orchestrator::builder(completion, Arc::new(ScriptedRetrieval))
        .config(fast_config())
        .build()
}

fn step(id: &str, kind: StepKind, next: &[&str]) -> WorkflowStep {
    WorkflowStep {
        id: StepId::new(id),
        name: id.to_string(),
        kind,
        agent_id: None,
        task_template: None,
        conditions: Vec::new(),
        next_steps: next.iter().map(|s| StepId::new(*s)).collect(),
        error_handling: ErrorHandling::default(),
    }
}

fn task_step(id: &str, submission: TaskSubmission, next: &[&str]) -> WorkflowStep {
    WorkflowStep {
        task_template: Some(submission),
        ..step(id, StepKind::AgentTask, next)
    }
}

fn workflow(id: &str, steps: Vec<WorkflowStep>) -> Workflow {
    Workflow {
        id: WorkflowId::new(id),
        name: format!("{id} workflow"),
        description: String::new(),
        kind: WorkflowKind::Sequential,
        status: WorkflowStatus::Active,
        steps,
        triggers: Vec::new(),
        variables: JsonMap::new(),
    }
}

fn ids(context: &ExecutionContext) -> Vec<&str> {
    context.history.iter().map(|h| h.step_id.as_str()).collect()
}

async fn wait_for_rows(store: &MemoryStore, table: &str, at_least: usize) -> Vec<Value> {
    for _ in 0..100 {
        let rows = store.log(table).await;
        if rows.len() >= at_least {
            return rows;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.log(table).await
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn research_task_goes_to_regulatory_researcher() {
    let orch = orchestrator_with(Arc::new(ScriptedCompletion::default()));
    let mut events = orch.subscribe();

    let task = orch
        .execute_task(TaskSubmission::new(
            TaskKind::Research,
            "What changed in SFDR level 2 disclosures?",
        ))
        .await;
    assert_eq!(task.status, TaskStatus::Pending);

    let done = orch.wait_for_task(task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(
        done.assigned_agent_id.as_ref().map(AgentId::as_str),
        Some("regulatory-researcher")
    );
    let output = done.output.unwrap();
    assert_eq!(output.sources, vec!["sfdr-l1-art8", "sfdr-rts-annex2"]);
    assert!((output.confidence - 0.86).abs() < f64::EPSILON);
    assert!(done.metrics.duration.is_some());

    let names: Vec<&str> = events.drain().iter().map(Event::name).collect();
    assert_eq!(names, vec!["taskCreated", "taskAssigned", "taskCompleted"]);

    // Agent returned to idle.
    let agent = orch
        .get_agent(&AgentId::new("regulatory-researcher"))
        .await
        .unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
}

#[tokio::test]
async fn analysis_has_no_default_agent_and_fails_after_three_attempts() {
    let completion = Arc::new(ScriptedCompletion::default());
    let orch = orchestrator_with(completion.clone());
    let mut events = orch.subscribe();

    let task = orch
        .execute_task(TaskSubmission::new(TaskKind::Analysis, "Assess Fund X"))
        .await;
    let failed = orch.wait_for_task(task.id).await.unwrap();

    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.metrics.retry_count, MAX_TASK_ATTEMPTS);
    assert!(failed.assigned_agent_id.is_none());
    assert!(completion.prompts.lock().await.is_empty());

    let names: Vec<&str> = events.drain().iter().map(Event::name).collect();
    assert_eq!(
        names,
        vec!["taskCreated", "taskRequeued", "taskRequeued", "taskFailed"]
    );
}

#[tokio::test]
async fn registered_agent_covers_analysis() {
    let orch = orchestrator_with(Arc::new(ScriptedCompletion::default()));
    let mut analyst = default_agents().remove(0);
    analyst.id = AgentId::new("generalist");
    analyst.capabilities.insert("regulatory_analysis".into());
    analyst.capabilities.insert("document_analysis".into());
    orch.register_agent(analyst).await;

    let task = orch
        .execute_task(TaskSubmission::new(TaskKind::Analysis, "Assess Fund X"))
        .await;
    let done = orch.wait_for_task(task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(
        done.assigned_agent_id.as_ref().map(AgentId::as_str),
        Some("generalist")
    );
    assert_eq!(done.output.unwrap().metadata["model"], "scripted-model");
}

#[tokio::test]
async fn oracle_failure_is_retried_then_fails_once() {
    let orch = orchestrator_with(Arc::new(ScriptedCompletion::failing_on("Validate")));
    let mut events = orch.subscribe();

    let task = orch
        .execute_task(TaskSubmission::new(TaskKind::Validation, "Validate the KYC summary"))
        .await;
    let failed = orch.wait_for_task(task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("model overloaded"));

    let names: Vec<&str> = events.drain().iter().map(Event::name).collect();
    let assigned = names.iter().filter(|n| **n == "taskAssigned").count();
    let terminal = names.iter().filter(|n| **n == "taskFailed").count();
    assert_eq!(assigned, 3);
    assert_eq!(terminal, 1);
}

#[tokio::test]
async fn queue_is_drained_one_task_at_a_time() {
    let completion = Arc::new(ScriptedCompletion::default());
    let orch = orchestrator_with(completion.clone());

    let mut submitted = Vec::new();
    for i in 0..6 {
        let kind = if i % 2 == 0 {
            TaskKind::Research
        } else {
            TaskKind::Validation
        };
        submitted.push(
            orch.execute_task(TaskSubmission::new(kind, format!("query {i}")))
                .await,
        );
    }
    for task in &submitted {
        let done = orch.wait_for_task(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    assert_eq!(completion.prompts.lock().await.len(), 6);
    assert_eq!(completion.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(orch.list_active_tasks().await.is_empty());
}

#[tokio::test]
async fn task_state_is_persisted_to_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DurableStore> =
        Arc::new(FileStore::new(dir.path().to_path_buf()).await.unwrap());
    let orch = Orchestrator::builder(
        Arc::new(ScriptedCompletion::default()),
        Arc::new(ScriptedRetrieval),
    )
    .store(store.clone())
    .build();

    let task = orch
        .execute_task(TaskSubmission::new(TaskKind::Monitoring, "Track AMLR changes"))
        .await;
    orch.wait_for_task(task.id).await.unwrap();

    let record = store
        .get("tasks", &task.id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record["status"], "completed");
    assert_eq!(record["assignedAgentId"], "regulatory-researcher");
    assert!(record["updatedAt"].is_string());
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn false_condition_still_follows_next_steps() {
    let orch = orchestrator_with(Arc::new(ScriptedCompletion::default()));
    let mut gate = step("gate", StepKind::Condition, &["after"]);
    gate.conditions = vec![Condition {
        field: "riskScore".into(),
        operator: ConditionOperator::GreaterThan,
        value: json!(70),
    }];
    let wf = workflow("gated", vec![gate, step("after", StepKind::Delay, &[])]);

    let mut vars = JsonMap::new();
    vars.insert("riskScore".into(), json!(40));
    let context = orch.run_workflow(wf, vars).await.unwrap();

    assert_eq!(ids(&context), vec!["gate", "after"]);
    assert_eq!(context.history[0].output, Some(json!({"conditionMet": false})));
    assert!(context
        .history
        .iter()
        .all(|h| h.status == StepStatus::Completed));
}

#[tokio::test]
async fn agent_task_step_carries_variables_as_context() {
    let completion = Arc::new(ScriptedCompletion::default());
    let orch = orchestrator_with(completion.clone());
    let wf = workflow(
        "research-then-validate",
        vec![
            task_step(
                "research",
                TaskSubmission::new(TaskKind::Research, "SFDR Article 8 scope"),
                &["validate"],
            ),
            task_step(
                "validate",
                TaskSubmission::new(TaskKind::Validation, "Validate the research"),
                &[],
            ),
        ],
    );
    let mut vars = JsonMap::new();
    vars.insert("fund".into(), json!("Fund X"));

    let context = orch.run_workflow(wf, vars).await.unwrap();
    assert_eq!(ids(&context), vec!["research", "validate"]);

    let research = &context.history[0];
    assert_eq!(research.status, StepStatus::Completed);
    let task = orch.get_task(research.task_id.unwrap()).await.unwrap();
    assert_eq!(task.input.context.as_deref(), Some(r#"{"fund":"Fund X"}"#));
    assert_eq!(research.output.as_ref().unwrap()["confidence"], json!(0.86));

    let status = orch.get_execution_status(context.execution_id).await.unwrap();
    assert_eq!(status.history.len(), 2);
}

#[tokio::test]
async fn failed_step_retries_are_capped_then_fallback_runs() {
    let orch = orchestrator_with(Arc::new(ScriptedCompletion::default()));
    // No default agent covers analysis, so this step always fails.
    let mut analyse = task_step(
        "analyse",
        TaskSubmission::new(TaskKind::Analysis, "Assess Fund X"),
        &["never"],
    );
    analyse.error_handling = ErrorHandling {
        retry_count: 2,
        fallback_step_id: Some(StepId::new("escalate")),
        escalation_agent_id: None,
    };
    let wf = workflow(
        "with-fallback",
        vec![
            analyse,
            step("never", StepKind::Delay, &[]),
            step("escalate", StepKind::Delay, &[]),
        ],
    );

    let context = orch.run_workflow(wf, JsonMap::new()).await.unwrap();
    assert_eq!(
        ids(&context),
        vec!["analyse", "analyse", "analyse", "escalate"]
    );
    let analyse_id = StepId::new("analyse");
    let attempts: Vec<_> = context.attempts(&analyse_id).collect();
    assert!(attempts.iter().all(|a| a.status == StepStatus::Failed));
    assert!(attempts[0].error.as_deref().unwrap().contains("failed"));
}

#[tokio::test]
async fn failed_step_without_policy_ends_branch() {
    let orch = orchestrator_with(Arc::new(ScriptedCompletion::default()));
    let wf = workflow(
        "dead-end",
        vec![
            task_step(
                "analyse",
                TaskSubmission::new(TaskKind::Analysis, "Assess Fund X"),
                &["after"],
            ),
            step("after", StepKind::Delay, &[]),
        ],
    );
    let context = orch.run_workflow(wf, JsonMap::new()).await.unwrap();
    assert_eq!(ids(&context), vec!["analyse"]);
    assert_eq!(context.history[0].status, StepStatus::Failed);
}

#[tokio::test]
async fn webhook_step_posts_and_records_reply() {
    let notifier = Arc::new(RecordingNotifier::default());
    let orch = Orchestrator::builder(
        Arc::new(ScriptedCompletion::default()),
        Arc::new(ScriptedRetrieval),
    )
    .notifier(notifier.clone())
    .config(fast_config())
    .build();

    let mut wf = workflow("notify", vec![step("ping", StepKind::Webhook, &[])]);
    wf.variables.insert("region".into(), json!("EU"));
    let mut vars = JsonMap::new();
    vars.insert("fund".into(), json!("Fund X"));

    let context = orch.run_workflow(wf, vars).await.unwrap();
    assert_eq!(context.history[0].output, Some(json!({"received": true})));

    let bodies = notifier.bodies.lock().await;
    assert_eq!(bodies.len(), 2);
    // Workflow start notification, then the step call.
    assert_eq!(bodies[0]["workflowId"], "notify");
    assert_eq!(bodies[0]["variables"], json!({"region": "EU", "fund": "Fund X"}));
    assert_eq!(bodies[1]["step"], "ping");
}

#[tokio::test]
async fn webhook_failure_does_not_fail_the_step() {
    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });
    let orch = Orchestrator::builder(
        Arc::new(ScriptedCompletion::default()),
        Arc::new(ScriptedRetrieval),
    )
    .notifier(notifier)
    .config(fast_config())
    .build();

    let wf = workflow(
        "notify",
        vec![
            step("ping", StepKind::Webhook, &["after"]),
            step("after", StepKind::Delay, &[]),
        ],
    );
    let context = orch.run_workflow(wf, JsonMap::new()).await.unwrap();
    assert_eq!(ids(&context), vec!["ping", "after"]);
    assert_eq!(context.history[0].status, StepStatus::Completed);
    assert!(context.history[0].output.is_none());
}

#[tokio::test]
async fn cyclic_workflow_is_rejected() {
    let orch = orchestrator_with(Arc::new(ScriptedCompletion::default()));
    let wf = workflow(
        "loop",
        vec![
            step("a", StepKind::Delay, &["b"]),
            step("b", StepKind::Delay, &["a"]),
        ],
    );
    assert!(orch.run_workflow(wf.clone(), JsonMap::new()).await.is_err());
    assert!(orch.register_workflow(wf).await.is_err());
}

#[tokio::test]
async fn background_workflow_reports_status() {
    let orch = orchestrator_with(Arc::new(ScriptedCompletion::default()));
    let wf = workflow("bg", vec![step("wait", StepKind::Delay, &[])]);
    let execution_id = orch.execute_workflow(wf, JsonMap::new()).await.unwrap();

    let mut finished = false;
    for _ in 0..100 {
        if let Some(status) = orch.get_execution_status(execution_id).await {
            if status
                .history
                .first()
                .is_some_and(|h| h.status == StepStatus::Completed)
            {
                finished = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(finished);
    assert!(orch.get_workflow(&WorkflowId::new("bg")).await.is_some());
}

// ---------------------------------------------------------------------------
// Collaboration and audit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collaboration_invites_every_participant() {
    let store = Arc::new(MemoryStore::new());
    let orch = Orchestrator::builder(
        Arc::new(ScriptedCompletion::default()),
        Arc::new(ScriptedRetrieval),
    )
    .store(store.clone())
    .build();

    let session = orch
        .start_collaboration(
            "Joint SFDR and AML review of Fund X",
            vec![
                AgentId::new("sfdr-specialist"),
                AgentId::new("aml-analyst"),
                AgentId::new("validation-agent"),
            ],
        )
        .await;

    assert_eq!(session.messages.len(), 3);
    assert_eq!(store.log("agent_messages").await.len(), 3);
    let stored = orch.get_session(session.id).await.unwrap();
    assert_eq!(stored.participants.len(), 3);
}

#[tokio::test]
async fn audit_trail_records_events() {
    let store = Arc::new(MemoryStore::new());
    let orch = Orchestrator::builder(
        Arc::new(ScriptedCompletion::default()),
        Arc::new(ScriptedRetrieval),
    )
    .store(store.clone())
    .build();

    let task = orch
        .execute_task(TaskSubmission::new(TaskKind::Research, "MiCA stablecoin rules"))
        .await;
    orch.wait_for_task(task.id).await.unwrap();

    let rows = wait_for_rows(&store, "events", 3).await;
    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(names, vec!["taskCreated", "taskAssigned", "taskCompleted"]);
    assert_eq!(rows[2]["payload"]["status"], "completed");
}
