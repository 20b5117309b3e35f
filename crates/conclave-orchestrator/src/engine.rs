use crate::audit::AuditTrail;
use crate::collaboration::CollaborationManager;
use crate::config::OrchestratorConfig;
use crate::events::{OrchestratorBus, OrchestratorEvent};
use crate::handlers::TaskExecutor;
use crate::ids::{AgentId, ExecutionId, SessionId, TaskId, WorkflowId};
use crate::mirror::StoreMirror;
use crate::registry::AgentRegistry;
use crate::scheduler::TaskScheduler;
use crate::triggers::TriggerScheduler;
use crate::types::{
    Agent, AgentMessage, CollaborationSession, ExecutionContext, JsonMap, Task, TaskSubmission,
    Workflow,
};
use crate::workflow::WorkflowEngine;
use conclave_core::{ConclaveResult, EventReceiver};
use conclave_oracle::{CompletionOracle, HttpWebhookNotifier, RetrievalOracle, WebhookNotifier};
use conclave_store::{DurableStore, MemoryStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// The orchestration service: one registry, one task queue, one workflow
/// engine and one collaboration manager sharing an event bus and a store.
///
/// Must be built inside a tokio runtime. Background work (queue timer,
/// schedule triggers, audit trail) stops when the orchestrator is dropped.
pub struct Orchestrator {
    config: OrchestratorConfig,
    events: OrchestratorBus,
    mirror: StoreMirror,
    registry: Arc<AgentRegistry>,
    scheduler: Arc<TaskScheduler>,
    workflows: Arc<WorkflowEngine>,
    collaboration: CollaborationManager,
    _audit: AuditTrail,
    handles: Vec<JoinHandle<()>>,
}

/// Assembles an [`Orchestrator`] from its external collaborators.
pub struct OrchestratorBuilder {
    completion: Arc<dyn CompletionOracle>,
    retrieval: Arc<dyn RetrievalOracle>,
    notifier: Option<Arc<dyn WebhookNotifier>>,
    store: Option<Arc<dyn DurableStore>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Notifier for workflow starts and webhook steps. Overrides
    /// `config.webhook_url`.
    pub fn notifier(mut self, notifier: Arc<dyn WebhookNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Durable store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Orchestrator {
        let config = self.config;
        let events = OrchestratorBus::new(config.event_capacity);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn DurableStore>);
        let mirror = StoreMirror::new(store);

        let notifier = self.notifier.or_else(|| {
            config
                .webhook_url
                .as_ref()
                .map(|url| Arc::new(HttpWebhookNotifier::new(url.clone())) as Arc<dyn WebhookNotifier>)
        });

        // Subscribe before anything can publish.
        let audit = AuditTrail::spawn(&events, mirror.clone());

        let registry = Arc::new(AgentRegistry::new(events.clone(), mirror.clone()));
        let executor = TaskExecutor::new(self.completion, self.retrieval);
        let scheduler = Arc::new(TaskScheduler::new(
            Arc::clone(&registry),
            executor,
            events.clone(),
            mirror.clone(),
        ));
        let workflows = Arc::new(
            WorkflowEngine::new(Arc::clone(&scheduler), notifier, events.clone())
                .with_step_retry_delay(config.step_retry_delay()),
        );
        let collaboration = CollaborationManager::new(events.clone(), mirror.clone());

        Orchestrator {
            config,
            events,
            mirror,
            registry,
            scheduler,
            workflows,
            collaboration,
            _audit: audit,
            handles: Vec::new(),
        }
    }
}

impl Orchestrator {
    pub fn builder(
        completion: Arc<dyn CompletionOracle>,
        retrieval: Arc<dyn RetrievalOracle>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            completion,
            retrieval,
            notifier: None,
            store: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Start the periodic queue drain. Submissions drain on their own; the
    /// timer only picks up work a drain left behind.
    pub fn start(&mut self) {
        info!(interval_ms = self.config.drain_interval_ms, "orchestrator started");
        self.handles
            .push(self.scheduler.start_processor(self.config.drain_interval()));
    }

    /// Register `workflows` and fire their enabled schedule triggers in the
    /// background. Returns how many triggers were scheduled.
    pub async fn start_triggers(&mut self, workflows: Vec<Workflow>) -> ConclaveResult<usize> {
        for workflow in &workflows {
            self.workflows.register_workflow(workflow.clone()).await?;
        }
        let triggers = TriggerScheduler::from_workflows(&workflows);
        let count = triggers.len();
        info!(count, "schedule triggers armed");
        if count > 0 {
            self.handles
                .push(triggers.start(Arc::clone(&self.workflows), self.events.clone()));
        }
        Ok(count)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The shared event bus.
    pub fn events(&self) -> &OrchestratorBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventReceiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        self.mirror.store()
    }

    // --- agents ---

    pub async fn register_agent(&self, agent: Agent) {
        self.registry.register_agent(agent).await;
    }

    pub async fn get_agent(&self, id: &AgentId) -> Option<Agent> {
        self.registry.get_agent(id).await
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.registry.list_agents().await
    }

    // --- tasks ---

    /// Queue a task and return it as created. Processing happens in the
    /// background; see [`wait_for_task`](Self::wait_for_task).
    pub async fn execute_task(&self, submission: TaskSubmission) -> Task {
        self.scheduler.execute_task(submission).await
    }

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.scheduler.get_task(id).await
    }

    /// Tasks that are pending, assigned or in progress.
    pub async fn list_active_tasks(&self) -> Vec<Task> {
        self.scheduler.list_active_tasks().await
    }

    /// Resolve once the task is completed or has failed for good.
    pub async fn wait_for_task(&self, id: TaskId) -> ConclaveResult<Task> {
        self.scheduler.wait_for_task(id).await
    }

    // --- workflows ---

    pub async fn register_workflow(&self, workflow: Workflow) -> ConclaveResult<()> {
        self.workflows.register_workflow(workflow).await
    }

    pub async fn get_workflow(&self, id: &WorkflowId) -> Option<Workflow> {
        self.workflows.get_workflow(id).await
    }

    pub async fn list_workflows(&self) -> Vec<Workflow> {
        self.workflows.list_workflows().await
    }

    /// Start a workflow run in the background.
    pub async fn execute_workflow(
        &self,
        workflow: Workflow,
        variables: JsonMap,
    ) -> ConclaveResult<ExecutionId> {
        self.workflows.execute_workflow(workflow, variables).await
    }

    /// Run a workflow to the end of its step graph.
    pub async fn run_workflow(
        &self,
        workflow: Workflow,
        variables: JsonMap,
    ) -> ConclaveResult<ExecutionContext> {
        self.workflows.run_workflow(workflow, variables).await
    }

    pub async fn get_execution_status(&self, id: ExecutionId) -> Option<ExecutionContext> {
        self.workflows.get_execution_status(id).await
    }

    // --- collaboration ---

    pub async fn start_collaboration(
        &self,
        objective: &str,
        participants: Vec<AgentId>,
    ) -> CollaborationSession {
        self.collaboration
            .start_collaboration(objective, participants)
            .await
    }

    pub async fn send_message(
        &self,
        session_id: SessionId,
        message: AgentMessage,
    ) -> ConclaveResult<()> {
        self.collaboration.send_message(session_id, message).await
    }

    pub async fn get_session(&self, id: SessionId) -> Option<CollaborationSession> {
        self.collaboration.get_session(id).await
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::TaskKind;
    use async_trait::async_trait;
    use conclave_core::ConclaveError;
    use conclave_oracle::{Completion, CompletionOptions, Retrieval, RetrievalQuery};

    struct Offline;

    #[async_trait]
    impl CompletionOracle for Offline {
        async fn complete(&self, _: &str, _: &CompletionOptions) -> ConclaveResult<Completion> {
            Err(ConclaveError::Oracle("offline".into()))
        }
    }

    #[async_trait]
    impl RetrievalOracle for Offline {
        async fn retrieve(&self, _: &RetrievalQuery) -> ConclaveResult<Retrieval> {
            Err(ConclaveError::Oracle("offline".into()))
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::builder(Arc::new(Offline), Arc::new(Offline)).build()
    }

    #[tokio::test]
    async fn test_builds_with_default_agents() {
        let orch = orchestrator();
        assert_eq!(orch.list_agents().await.len(), 5);
        assert!(orch
            .get_agent(&AgentId::new("validation-agent"))
            .await
            .is_some());
        assert_eq!(orch.config().event_capacity, 1000);
    }

    #[tokio::test]
    async fn test_failing_oracle_fails_task() {
        let orch = orchestrator();
        let task = orch
            .execute_task(TaskSubmission::new(TaskKind::Monitoring, "Watch SFDR"))
            .await;
        let settled = orch.wait_for_task(task.id).await.unwrap();
        assert_eq!(settled.metrics.retry_count, 3);
        assert!(settled.error.unwrap().contains("offline"));
        assert!(orch.list_active_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_url_builds_notifier() {
        let config = OrchestratorConfig {
            webhook_url: Some("http://127.0.0.1:9/hook".into()),
            ..OrchestratorConfig::default()
        };
        let mut orch = Orchestrator::builder(Arc::new(Offline), Arc::new(Offline))
            .config(config)
            .build();
        orch.start();
        assert_eq!(orch.handles.len(), 1);
    }
}
