use crate::ids::{AgentId, ExecutionId, MessageId, SessionId, StepId, TaskId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Free-form JSON object used for parameters, variables and shared context.
pub type JsonMap = Map<String, Value>;

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Role an agent plays in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Specialist,
    Coordinator,
    Validator,
    Researcher,
    Analyst,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Specialist => write!(f, "specialist"),
            AgentKind::Coordinator => write!(f, "coordinator"),
            AgentKind::Validator => write!(f, "validator"),
            AgentKind::Researcher => write!(f, "researcher"),
            AgentKind::Analyst => write!(f, "analyst"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Offline,
}

/// Descriptive metadata. Historical figures only; they feed agent ranking but
/// are never updated by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    pub max_concurrent_tasks: u32,
    /// Milliseconds.
    pub average_response_time: u64,
    pub success_rate: f64,
}

/// Per-agent model settings. `temperature` and `max_tokens` are passed to the
/// completion oracle; `timeout` and `retry_attempts` are carried only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Milliseconds.
    pub timeout: u64,
    pub retry_attempts: u32,
}

/// A capability-tagged worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub capabilities: BTreeSet<String>,
    pub status: AgentStatus,
    pub metadata: AgentMetadata,
    pub config: AgentConfig,
}

impl Agent {
    /// True when every required capability is declared.
    pub fn has_capabilities(&self, required: &[&str]) -> bool {
        required.iter().all(|cap| self.capabilities.contains(*cap))
    }

    /// Ranking score: historical success rate, penalised by response time.
    pub fn suitability(&self) -> f64 {
        self.metadata.success_rate - self.metadata.average_response_time as f64 / 10_000.0
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Analysis,
    Research,
    Validation,
    Synthesis,
    Monitoring,
}

impl TaskKind {
    /// Capabilities an agent must declare to take a task of this kind.
    pub fn required_capabilities(self) -> &'static [&'static str] {
        match self {
            TaskKind::Analysis => &["regulatory_analysis", "document_analysis"],
            TaskKind::Research => &["regulatory_search", "document_analysis"],
            TaskKind::Validation => &["result_validation", "accuracy_checking"],
            TaskKind::Synthesis => &["workflow_coordination", "task_delegation"],
            TaskKind::Monitoring => &["change_detection", "regulatory_search"],
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Analysis => write!(f, "analysis"),
            TaskKind::Research => write!(f, "research"),
            TaskKind::Validation => write!(f, "validation"),
            TaskKind::Synthesis => write!(f, "synthesis"),
            TaskKind::Monitoring => write!(f, "monitoring"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Lifecycle of a task. `Cancelled` exists for callers and storage but the
/// scheduler never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, failed or cancelled.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Pending, assigned or in progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::InProgress
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceLevel {
    Basic,
    Standard,
    Strict,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConstraints {
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_level: Option<ComplianceLevel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<TaskConstraints>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    pub result: String,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    pub reasoning: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds from `started_at` to `completed_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
}

/// A unit of work tracked by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    /// Recorded, not scheduled against.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    pub input: TaskInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskOutput>,
    /// Message of the last execution error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: TaskMetrics,
}

impl Task {
    /// Materialise a submission as a fresh `pending` task.
    pub fn from_submission(submission: TaskSubmission) -> Self {
        Self {
            id: TaskId::new(),
            kind: submission.kind,
            priority: submission.priority,
            status: TaskStatus::Pending,
            assigned_agent_id: None,
            parent_task_id: submission.parent_task_id,
            dependencies: submission.dependencies,
            input: submission.input,
            output: None,
            error: None,
            metrics: TaskMetrics {
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                duration: None,
                retry_count: 0,
            },
        }
    }

    /// Parameter lookup on the task input.
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.input.parameters.get(key)
    }
}

/// What a caller provides to create a task. Also the task template of a
/// workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub input: TaskInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskId>,
}

impl TaskSubmission {
    pub fn new(kind: TaskKind, query: impl Into<String>) -> Self {
        Self {
            kind,
            priority: TaskPriority::default(),
            input: TaskInput {
                query: query.into(),
                ..TaskInput::default()
            },
            parent_task_id: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.input.context = Some(context.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.parameters.insert(key.into(), value);
        self
    }

    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_task_id = Some(parent);
        self
    }
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// Declared shape of a workflow. Informational; execution always walks the
/// step graph from the first step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    #[default]
    Sequential,
    Parallel,
    Conditional,
    Loop,
    Hybrid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Schedule,
    Event,
    Webhook,
    Manual,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    /// 7-field cron expression (sec min hour day-of-month month day-of-week year).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTrigger {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default)]
    pub config: TriggerConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Step types. Only `AgentTask`, `Condition` and `Webhook` have executors;
/// the rest complete immediately with no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    AgentTask,
    Condition,
    Loop,
    Parallel,
    Webhook,
    Delay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
}

/// `variables[field] <operator> value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandling {
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_step_id: Option<StepId>,
    /// Carried only; escalation is not implemented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_agent_id: Option<AgentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: StepId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Recorded on the execution history; assignment stays capability-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_template: Option<TaskSubmission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub next_steps: Vec<StepId>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: WorkflowKind,
    #[serde(default)]
    pub status: WorkflowStatus,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub triggers: Vec<WorkflowTrigger>,
    #[serde(default)]
    pub variables: JsonMap,
}

impl Workflow {
    pub fn step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| &s.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One attempt at one step, appended to the execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub step_id: StepId,
    pub status: StepStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Per-run mutable state of a workflow. Lives in memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub variables: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepId>,
    pub history: Vec<ExecutionStep>,
    pub start_time: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(workflow_id: WorkflowId, variables: JsonMap) -> Self {
        Self {
            workflow_id,
            execution_id: ExecutionId::new(),
            variables,
            current_step: None,
            history: Vec::new(),
            start_time: Utc::now(),
        }
    }

    /// History entries recorded for `step`, oldest first.
    pub fn attempts<'a>(&'a self, step: &'a StepId) -> impl Iterator<Item = &'a ExecutionStep> {
        self.history.iter().filter(move |h| &h.step_id == step)
    }
}

// ---------------------------------------------------------------------------
// Collaboration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: MessageId,
    pub from: AgentId,
    pub to: AgentId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AgentMessage {
    pub fn new(from: AgentId, to: AgentId, kind: MessageKind, content: Value) -> Self {
        Self {
            id: MessageId::new(),
            from,
            to,
            kind,
            content,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationSession {
    pub id: SessionId,
    pub name: String,
    pub participants: Vec<AgentId>,
    pub objective: String,
    pub status: SessionStatus,
    pub messages: Vec<AgentMessage>,
    pub shared_context: JsonMap,
    pub created_at: DateTime<Utc>,
}
