//! Multi-agent orchestration for regulatory-compliance work.
//!
//! Tasks are matched to registered agents by declared capabilities and run
//! one at a time off a FIFO queue, with a bounded retry. Workflows are step
//! graphs walked recursively over shared variables, and collaboration
//! sessions fan notifications out to a group of agents. Every state change
//! is published on an event bus and mirrored into a durable store.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Facade wiring registry, scheduler, workflows and collaboration together.
//! - [`TaskScheduler`]: Single-flight queue drain with capability matching.
//! - [`WorkflowEngine`]: Recursive step-graph executor.
//! - [`CollaborationManager`]: Sessions and agent messages.
//! - [`TriggerScheduler`]: Cron-driven workflow triggers.
//! - [`OrchestratorEvent`]: Everything announced on the bus.

/// Event-table audit subscriber.
pub mod audit;
/// Collaboration sessions and agent messages.
pub mod collaboration;
/// Workflow step condition evaluation.
pub mod conditions;
/// Orchestrator runtime settings.
pub mod config;
/// The orchestrator facade.
pub mod engine;
/// Orchestrator events.
pub mod events;
/// Task handlers per task kind.
pub mod handlers;
/// Typed identifiers.
pub mod ids;
/// Best-effort durable-store writes.
pub mod mirror;
/// Default agent roster.
pub mod profiles;
/// Agent registry.
pub mod registry;
/// Task scheduler.
pub mod scheduler;
/// FIFO task queue.
pub mod task_queue;
/// Cron schedule triggers.
pub mod triggers;
/// Shared domain types (Agent, Task, Workflow, etc.).
pub mod types;
/// Workflow engine.
pub mod workflow;

pub use audit::AuditTrail;
pub use collaboration::{CollaborationManager, SYSTEM_AGENT};
pub use conditions::evaluate_conditions;
pub use config::OrchestratorConfig;
pub use engine::{Orchestrator, OrchestratorBuilder};
pub use events::{OrchestratorBus, OrchestratorEvent};
pub use handlers::{extract_validation_score, TaskExecutor, DEFAULT_VALIDATION_SCORE};
pub use ids::{AgentId, ExecutionId, MessageId, SessionId, StepId, TaskId, WorkflowId};
pub use mirror::StoreMirror;
pub use profiles::default_agents;
pub use registry::AgentRegistry;
pub use scheduler::{TaskScheduler, MAX_TASK_ATTEMPTS, MIN_DRAIN_INTERVAL};
pub use task_queue::TaskQueue;
pub use triggers::{ScheduledTrigger, TriggerScheduler};
pub use types::{
    Agent, AgentKind, AgentMessage, AgentStatus, CollaborationSession, Condition,
    ConditionOperator, ExecutionContext, ExecutionStep, JsonMap, MessageKind, StepKind,
    StepStatus, Task, TaskKind, TaskOutput, TaskPriority, TaskStatus, TaskSubmission, Workflow,
    WorkflowStep, WorkflowTrigger,
};
pub use workflow::{validate_workflow, WorkflowEngine};
