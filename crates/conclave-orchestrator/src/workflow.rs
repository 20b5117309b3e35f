use crate::conditions::evaluate_conditions;
use crate::events::{OrchestratorBus, OrchestratorEvent};
use crate::ids::{ExecutionId, StepId, WorkflowId};
use crate::scheduler::TaskScheduler;
use crate::types::{
    ExecutionContext, ExecutionStep, JsonMap, StepKind, StepStatus, TaskStatus, Workflow,
    WorkflowStep,
};
use chrono::Utc;
use conclave_core::{ConclaveError, ConclaveResult};
use conclave_oracle::WebhookNotifier;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Delay before a failed step is re-executed.
pub const DEFAULT_STEP_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Walks workflow step graphs.
///
/// A run starts at the first step and recurses into every id in a completed
/// step's `next_steps`. A condition step records `conditionMet` but does not
/// gate its successors. A failed step is retried while its retry budget
/// lasts, then redirected to its fallback step, else the branch ends.
pub struct WorkflowEngine {
    scheduler: Arc<TaskScheduler>,
    notifier: Option<Arc<dyn WebhookNotifier>>,
    events: OrchestratorBus,
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    executions: RwLock<HashMap<ExecutionId, ExecutionContext>>,
    step_retry_delay: Duration,
}

/// State owned by one run while it executes.
struct Run {
    workflow: Workflow,
    context: ExecutionContext,
    retries_left: HashMap<StepId, u32>,
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

impl WorkflowEngine {
    pub fn new(
        scheduler: Arc<TaskScheduler>,
        notifier: Option<Arc<dyn WebhookNotifier>>,
        events: OrchestratorBus,
    ) -> Self {
        Self {
            scheduler,
            notifier,
            events,
            workflows: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            step_retry_delay: DEFAULT_STEP_RETRY_DELAY,
        }
    }

    pub fn with_step_retry_delay(mut self, delay: Duration) -> Self {
        self.step_retry_delay = delay;
        self
    }

    /// Validate and store a workflow definition.
    pub async fn register_workflow(&self, workflow: Workflow) -> ConclaveResult<()> {
        validate_workflow(&workflow)?;
        info!(workflow_id = %workflow.id, steps = workflow.steps.len(), "workflow registered");
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow);
        Ok(())
    }

    pub async fn get_workflow(&self, id: &WorkflowId) -> Option<Workflow> {
        self.workflows.read().await.get(id).cloned()
    }

    pub async fn list_workflows(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        workflows
    }

    /// Latest snapshot of an execution, running or finished.
    pub async fn get_execution_status(&self, id: ExecutionId) -> Option<ExecutionContext> {
        self.executions.read().await.get(&id).cloned()
    }

    /// Start a run in the background and return its id.
    pub async fn execute_workflow(
        self: &Arc<Self>,
        workflow: Workflow,
        variables: JsonMap,
    ) -> ConclaveResult<ExecutionId> {
        let run = self.prepare(workflow, variables).await?;
        let execution_id = run.context.execution_id;
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drive(run).await;
        });
        Ok(execution_id)
    }

    /// Run the whole step graph and return the final context.
    pub async fn run_workflow(
        &self,
        workflow: Workflow,
        variables: JsonMap,
    ) -> ConclaveResult<ExecutionContext> {
        let run = self.prepare(workflow, variables).await?;
        Ok(self.drive(run).await)
    }

    /// Validate, record, notify and announce a new run.
    async fn prepare(&self, workflow: Workflow, variables: JsonMap) -> ConclaveResult<Run> {
        validate_workflow(&workflow)?;

        // Caller variables override the workflow's defaults.
        let mut merged = workflow.variables.clone();
        merged.extend(variables);

        let mut context = ExecutionContext::new(workflow.id.clone(), merged);
        context.current_step = workflow.steps.first().map(|s| s.id.clone());

        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow.clone());
        self.snapshot(&context).await;

        if let Some(notifier) = &self.notifier {
            let body = json!({
                "workflowId": workflow.id,
                "workflowName": workflow.name,
                "variables": context.variables,
                "timestamp": Utc::now().to_rfc3339(),
            });
            if let Err(e) = notifier.post(&body).await {
                warn!(workflow_id = %workflow.id, error = %e, "workflow webhook failed");
            }
        }

        info!(
            workflow_id = %workflow.id,
            execution_id = %context.execution_id,
            "workflow started"
        );
        self.events.publish(OrchestratorEvent::WorkflowStarted {
            workflow: Box::new(workflow.clone()),
            execution_id: context.execution_id,
        });

        Ok(Run {
            workflow,
            context,
            retries_left: HashMap::new(),
        })
    }

    async fn drive(&self, mut run: Run) -> ExecutionContext {
        if let Some(first) = run.workflow.steps.first().cloned() {
            self.execute_step(&mut run, &first).await;
        }
        info!(
            execution_id = %run.context.execution_id,
            steps_run = run.context.history.len(),
            "workflow run finished"
        );
        self.snapshot(&run.context).await;
        run.context
    }

    async fn snapshot(&self, context: &ExecutionContext) {
        self.executions
            .write()
            .await
            .insert(context.execution_id, context.clone());
    }

    fn execute_step<'a>(&'a self, run: &'a mut Run, step: &'a WorkflowStep) -> StepFuture<'a> {
        Box::pin(async move {
            run.context.current_step = Some(step.id.clone());
            let mut record = ExecutionStep {
                step_id: step.id.clone(),
                status: StepStatus::Running,
                start_time: Utc::now(),
                end_time: None,
                input: Value::Object(run.context.variables.clone()),
                output: None,
                error: None,
                agent_id: step.agent_id.clone(),
                task_id: None,
            };
            let index = run.context.history.len();
            run.context.history.push(record.clone());
            self.snapshot(&run.context).await;
            debug!(execution_id = %run.context.execution_id, step_id = %step.id, kind = ?step.kind, "step running");

            let result = self.dispatch(&run.context.variables, step, &mut record).await;
            record.end_time = Some(Utc::now());
            let execution_id = run.context.execution_id;

            match result {
                Ok(output) => {
                    record.status = StepStatus::Completed;
                    record.output = output;
                    run.context.history[index] = record.clone();
                    self.snapshot(&run.context).await;
                    self.events.publish(OrchestratorEvent::WorkflowStepCompleted {
                        execution_id,
                        step: record,
                    });

                    for next_id in &step.next_steps {
                        match run.workflow.step(next_id).cloned() {
                            Some(next) => self.execute_step(run, &next).await,
                            None => warn!(%execution_id, step_id = %next_id, "unknown next step, skipping"),
                        }
                    }
                }
                Err(e) => {
                    warn!(%execution_id, step_id = %step.id, error = %e, "step failed");
                    record.status = StepStatus::Failed;
                    record.error = Some(e.to_string());
                    run.context.history[index] = record.clone();
                    self.snapshot(&run.context).await;
                    self.events.publish(OrchestratorEvent::WorkflowStepFailed {
                        execution_id,
                        step: record,
                    });
                    self.handle_step_error(run, step).await;
                }
            }
        })
    }

    async fn handle_step_error(&self, run: &mut Run, step: &WorkflowStep) {
        let execution_id = run.context.execution_id;
        let remaining = run
            .retries_left
            .entry(step.id.clone())
            .or_insert(step.error_handling.retry_count);

        if *remaining > 0 {
            *remaining -= 1;
            info!(%execution_id, step_id = %step.id, retries_left = *remaining, "retrying step");
            tokio::time::sleep(self.step_retry_delay).await;
            self.execute_step(run, step).await;
            return;
        }

        match &step.error_handling.fallback_step_id {
            Some(fallback_id) => match run.workflow.step(fallback_id).cloned() {
                Some(fallback) => {
                    info!(%execution_id, step_id = %step.id, fallback = %fallback_id, "running fallback step");
                    self.execute_step(run, &fallback).await;
                }
                None => warn!(%execution_id, step_id = %fallback_id, "unknown fallback step, branch ends"),
            },
            None => debug!(%execution_id, step_id = %step.id, "no error policy left, branch ends"),
        }
    }

    /// Execute one step's body and return its output.
    async fn dispatch(
        &self,
        variables: &JsonMap,
        step: &WorkflowStep,
        record: &mut ExecutionStep,
    ) -> ConclaveResult<Option<Value>> {
        match step.kind {
            StepKind::AgentTask => {
                let Some(template) = step.task_template.clone() else {
                    warn!(step_id = %step.id, "agent_task step has no task template");
                    return Ok(None);
                };
                let mut submission = template;
                submission.input.context = Some(serde_json::to_string(variables)?);

                let task = self.scheduler.execute_task(submission).await;
                record.task_id = Some(task.id);
                let settled = self.scheduler.wait_for_task(task.id).await?;

                if settled.status == TaskStatus::Failed {
                    return Err(ConclaveError::Workflow(format!(
                        "Task {} failed: {}",
                        settled.id,
                        settled.error.unwrap_or_default()
                    )));
                }
                Ok(settled.output.map(serde_json::to_value).transpose()?)
            }
            StepKind::Condition => {
                let met = evaluate_conditions(&step.conditions, variables);
                Ok(Some(json!({ "conditionMet": met })))
            }
            StepKind::Webhook => {
                let Some(notifier) = &self.notifier else {
                    debug!(step_id = %step.id, "no webhook configured, skipping call");
                    return Ok(None);
                };
                let body = json!({ "step": step.name, "variables": variables });
                match notifier.post(&body).await {
                    Ok(reply) => Ok(Some(reply)),
                    Err(e) => {
                        warn!(step_id = %step.id, error = %e, "webhook step call failed");
                        Ok(None)
                    }
                }
            }
            StepKind::Loop | StepKind::Parallel | StepKind::Delay => {
                debug!(step_id = %step.id, kind = ?step.kind, "step kind has no executor");
                Ok(None)
            }
        }
    }
}

/// Reject workflows with no steps or with a cycle in the `next_steps` graph.
pub fn validate_workflow(workflow: &Workflow) -> ConclaveResult<()> {
    if workflow.steps.is_empty() {
        return Err(ConclaveError::Workflow(format!(
            "Workflow {} has no steps",
            workflow.id
        )));
    }
    if has_cycle(workflow) {
        return Err(ConclaveError::Workflow(format!(
            "Cycle detected in steps of workflow {}",
            workflow.id
        )));
    }
    Ok(())
}

fn has_cycle(workflow: &Workflow) -> bool {
    let mut visited = HashMap::new();
    workflow
        .steps
        .iter()
        .any(|step| dfs_cycle(workflow, &step.id, &mut visited))
}

fn dfs_cycle<'a>(workflow: &'a Workflow, id: &'a StepId, visited: &mut HashMap<&'a StepId, u8>) -> bool {
    match visited.get(id) {
        Some(1) => return true,  // back edge
        Some(2) => return false, // done
        _ => {}
    }
    visited.insert(id, 1);
    if let Some(step) = workflow.step(id) {
        for next in &step.next_steps {
            if dfs_cycle(workflow, next, visited) {
                return true;
            }
        }
    }
    visited.insert(id, 2);
    false
}
