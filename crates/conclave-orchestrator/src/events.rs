use crate::ids::{ExecutionId, WorkflowId};
use crate::types::{Agent, AgentMessage, CollaborationSession, ExecutionStep, Task, Workflow};
use conclave_core::Event;
use serde::Serialize;

/// Every state transition the orchestrator announces.
///
/// Serialized with the event name as `event` and the entity snapshot as
/// `payload`, which is also the shape written to the `events` table.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum OrchestratorEvent {
    AgentRegistered(Agent),
    TaskCreated(Task),
    TaskAssigned {
        task: Task,
        agent: Agent,
    },
    /// A failed attempt sent the task back to the queue.
    TaskRequeued(Task),
    TaskCompleted(Task),
    /// Terminal failure, published once per task.
    TaskFailed {
        task: Task,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    WorkflowStarted {
        workflow: Box<Workflow>,
        execution_id: ExecutionId,
    },
    #[serde(rename_all = "camelCase")]
    WorkflowStepCompleted {
        execution_id: ExecutionId,
        step: ExecutionStep,
    },
    #[serde(rename_all = "camelCase")]
    WorkflowStepFailed {
        execution_id: ExecutionId,
        step: ExecutionStep,
    },
    #[serde(rename_all = "camelCase")]
    WorkflowTriggered {
        workflow_id: WorkflowId,
        trigger_id: String,
        execution_id: ExecutionId,
    },
    CollaborationStarted(CollaborationSession),
    MessageSent(AgentMessage),
}

impl Event for OrchestratorEvent {
    fn name(&self) -> &'static str {
        match self {
            OrchestratorEvent::AgentRegistered(_) => "agentRegistered",
            OrchestratorEvent::TaskCreated(_) => "taskCreated",
            OrchestratorEvent::TaskAssigned { .. } => "taskAssigned",
            OrchestratorEvent::TaskRequeued(_) => "taskRequeued",
            OrchestratorEvent::TaskCompleted(_) => "taskCompleted",
            OrchestratorEvent::TaskFailed { .. } => "taskFailed",
            OrchestratorEvent::WorkflowStarted { .. } => "workflowStarted",
            OrchestratorEvent::WorkflowStepCompleted { .. } => "workflowStepCompleted",
            OrchestratorEvent::WorkflowStepFailed { .. } => "workflowStepFailed",
            OrchestratorEvent::WorkflowTriggered { .. } => "workflowTriggered",
            OrchestratorEvent::CollaborationStarted(_) => "collaborationStarted",
            OrchestratorEvent::MessageSent(_) => "messageSent",
        }
    }
}

/// Event bus specialised to orchestrator events.
pub type OrchestratorBus = conclave_core::EventBus<OrchestratorEvent>;
