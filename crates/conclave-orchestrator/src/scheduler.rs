use crate::events::{OrchestratorBus, OrchestratorEvent};
use crate::handlers::TaskExecutor;
use crate::ids::TaskId;
use crate::mirror::{StoreMirror, TASKS_TABLE};
use crate::registry::AgentRegistry;
use crate::task_queue::TaskQueue;
use crate::types::{Agent, AgentStatus, Task, TaskOutput, TaskStatus, TaskSubmission};
use chrono::Utc;
use conclave_core::{ConclaveError, ConclaveResult};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Attempts a task gets before it is failed for good. Per-agent
/// `retry_attempts` does not change this.
pub const MAX_TASK_ATTEMPTS: u32 = 3;

/// Shortest period the safety-net drain timer runs at.
pub const MIN_DRAIN_INTERVAL: Duration = Duration::from_millis(1);

/// FIFO task scheduler with capability matching and bounded retry.
///
/// The queue is drained by at most one worker at a time: each task is
/// processed to completion before the next one is popped.
pub struct TaskScheduler {
    queue: RwLock<TaskQueue>,
    registry: Arc<AgentRegistry>,
    executor: TaskExecutor,
    events: OrchestratorBus,
    mirror: StoreMirror,
    draining: AtomicBool,
    waiters: Mutex<HashMap<TaskId, Vec<oneshot::Sender<Task>>>>,
}

impl TaskScheduler {
    pub fn new(
        registry: Arc<AgentRegistry>,
        executor: TaskExecutor,
        events: OrchestratorBus,
        mirror: StoreMirror,
    ) -> Self {
        Self {
            queue: RwLock::new(TaskQueue::new()),
            registry,
            executor,
            events,
            mirror,
            draining: AtomicBool::new(false),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Create a `pending` task, persist and announce it, and kick off a
    /// background drain. Returns the task as submitted.
    pub async fn execute_task(self: &Arc<Self>, submission: TaskSubmission) -> Task {
        let task = Task::from_submission(submission);
        info!(task_id = %task.id, kind = %task.kind, priority = ?task.priority, "task created");

        // The record must exist before any drain can pop the task, or the
        // transition updates would be dropped and this snapshot written last.
        self.mirror
            .upsert(TASKS_TABLE, &task.id.to_string(), &task)
            .await;
        self.queue.write().await.push(task.clone());
        self.events.publish(OrchestratorEvent::TaskCreated(task.clone()));

        if !self.draining.load(Ordering::Acquire) {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move { scheduler.drain().await });
        }
        task
    }

    /// Process queued tasks one at a time until the queue is empty.
    ///
    /// Returns immediately if another drain is in progress.
    pub async fn drain(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            loop {
                let next = self.queue.write().await.pop_front();
                let Some(task) = next else { break };
                self.process_task(task).await;
            }

            self.draining.store(false, Ordering::Release);

            // A submission that raced with the flag reset would otherwise sit
            // until the next timer tick.
            if self.queue.read().await.queued_len() == 0 {
                return;
            }
        }
    }

    /// Spawn the safety-net timer that re-runs [`drain`](Self::drain). A zero
    /// interval is raised to [`MIN_DRAIN_INTERVAL`].
    pub fn start_processor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let interval = interval.max(MIN_DRAIN_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                scheduler.drain().await;
            }
        })
    }

    /// Best idle agent declaring every capability the task kind requires.
    pub async fn find_suitable_agent(&self, task: &Task) -> Option<Agent> {
        self.registry
            .best_idle_match(task.kind.required_capabilities())
            .await
    }

    /// Run one attempt of a task: match, assign, execute, settle or requeue.
    pub async fn process_task(&self, task: Task) {
        let Some(agent) = self.find_suitable_agent(&task).await else {
            let err = ConclaveError::AgentUnavailable(task.id.to_string());
            self.record_failure(task.id, &err).await;
            return;
        };

        self.registry.set_status(&agent.id, AgentStatus::Busy).await;

        let Some(assigned) = self
            .transition(task.id, |t| {
                t.assigned_agent_id = Some(agent.id.clone());
                t.status = TaskStatus::Assigned;
                t.metrics.started_at = Some(Utc::now());
            })
            .await
        else {
            self.registry.set_status(&agent.id, AgentStatus::Idle).await;
            return;
        };
        info!(task_id = %task.id, agent_id = %agent.id, "task assigned");
        self.events.publish(OrchestratorEvent::TaskAssigned {
            task: assigned,
            agent: agent.clone(),
        });

        let running = self
            .transition(task.id, |t| t.status = TaskStatus::InProgress)
            .await;

        let result = match running {
            Some(running) => self.executor.execute(&agent, &running).await,
            None => Err(ConclaveError::Orchestrator(format!(
                "task {} vanished",
                task.id
            ))),
        };

        self.registry.set_status(&agent.id, AgentStatus::Idle).await;

        match result {
            Ok(output) => self.record_success(task.id, output).await,
            Err(e) => self.record_failure(task.id, &e).await,
        }
    }

    async fn record_success(&self, id: TaskId, output: TaskOutput) {
        let Some(task) = self
            .transition(id, |t| {
                let now = Utc::now();
                t.status = TaskStatus::Completed;
                t.output = Some(output);
                t.error = None;
                t.metrics.completed_at = Some(now);
                t.metrics.duration = t
                    .metrics
                    .started_at
                    .map(|started| (now - started).num_milliseconds().max(0) as u64);
            })
            .await
        else {
            return;
        };
        info!(task_id = %id, duration_ms = ?task.metrics.duration, "task completed");
        self.events.publish(OrchestratorEvent::TaskCompleted(task.clone()));
        self.notify_waiters(task).await;
    }

    async fn record_failure(&self, id: TaskId, err: &ConclaveError) {
        let message = err.to_string();
        let Some(task) = self
            .transition(id, |t| {
                t.metrics.retry_count += 1;
                t.error = Some(message.clone());
                t.status = if t.metrics.retry_count < MAX_TASK_ATTEMPTS {
                    TaskStatus::Pending
                } else {
                    TaskStatus::Failed
                };
            })
            .await
        else {
            return;
        };

        if task.status == TaskStatus::Pending {
            if err.is_agent_unavailable() {
                warn!(
                    task_id = %id,
                    kind = %task.kind,
                    attempt = task.metrics.retry_count,
                    "no idle agent has the required capabilities, requeueing"
                );
            } else {
                warn!(
                    task_id = %id,
                    attempt = task.metrics.retry_count,
                    error = %message,
                    "task attempt failed, requeueing"
                );
            }
            self.queue.write().await.requeue(id);
            self.events.publish(OrchestratorEvent::TaskRequeued(task));
        } else {
            error!(task_id = %id, attempts = task.metrics.retry_count, error = %message, "task failed");
            self.events.publish(OrchestratorEvent::TaskFailed {
                task: task.clone(),
                error: message,
            });
            self.notify_waiters(task).await;
        }
    }

    /// Apply `change` to the stored task, mirror the new status and return
    /// a snapshot.
    async fn transition(&self, id: TaskId, change: impl FnOnce(&mut Task)) -> Option<Task> {
        let snapshot = {
            let mut queue = self.queue.write().await;
            let task = queue.get_mut(id)?;
            change(task);
            task.clone()
        };
        debug!(task_id = %id, status = ?snapshot.status, "task transition");
        self.mirror
            .update(
                TASKS_TABLE,
                &id.to_string(),
                json!({
                    "status": snapshot.status,
                    "assignedAgentId": snapshot.assigned_agent_id,
                    "output": snapshot.output,
                    "error": snapshot.error,
                    "metrics": snapshot.metrics,
                }),
            )
            .await;
        Some(snapshot)
    }

    async fn notify_waiters(&self, task: Task) {
        let senders = self.waiters.lock().await.remove(&task.id);
        for sender in senders.into_iter().flatten() {
            let _ = sender.send(task.clone());
        }
    }

    /// Resolve once the task is completed or failed.
    pub async fn wait_for_task(&self, id: TaskId) -> ConclaveResult<Task> {
        let receiver = {
            let mut waiters = self.waiters.lock().await;
            match self.queue.read().await.get(id) {
                None => {
                    return Err(ConclaveError::Orchestrator(format!("Unknown task: {id}")));
                }
                Some(task) if task.status.is_settled() => return Ok(task.clone()),
                Some(_) => {}
            }
            let (tx, rx) = oneshot::channel();
            waiters.entry(id).or_default().push(tx);
            rx
        };
        receiver
            .await
            .map_err(|_| ConclaveError::Orchestrator(format!("Scheduler dropped task {id}")))
    }

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.queue.read().await.get(id).cloned()
    }

    /// Tasks that are pending, assigned or in progress.
    pub async fn list_active_tasks(&self) -> Vec<Task> {
        self.queue.read().await.active()
    }

    /// True while a drain is running.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }
}
