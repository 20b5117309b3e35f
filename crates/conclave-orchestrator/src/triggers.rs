use crate::events::{OrchestratorBus, OrchestratorEvent};
use crate::types::{JsonMap, TriggerKind, Workflow, WorkflowTrigger};
use crate::workflow::WorkflowEngine;
use chrono::{DateTime, Utc};
use conclave_core::{ConclaveError, ConclaveResult};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long to idle when there is nothing schedulable.
const IDLE_SLEEP: Duration = Duration::from_secs(60);

/// An enabled schedule trigger bound to its workflow.
#[derive(Debug, Clone)]
pub struct ScheduledTrigger {
    pub workflow: Workflow,
    pub trigger: WorkflowTrigger,
    pub schedule: Schedule,
}

impl ScheduledTrigger {
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }
}

/// Fires workflows whose `schedule` triggers come due.
///
/// Each firing starts a background run with the workflow's own variables.
/// Event, webhook and manual triggers are ignored here.
#[derive(Debug, Default)]
pub struct TriggerScheduler {
    triggers: Vec<ScheduledTrigger>,
}

impl TriggerScheduler {
    /// Collect every enabled schedule trigger with a valid cron expression.
    /// Invalid expressions are logged and skipped.
    pub fn from_workflows(workflows: &[Workflow]) -> Self {
        let mut triggers = Vec::new();
        for workflow in workflows {
            for trigger in &workflow.triggers {
                if !trigger.enabled || trigger.kind != TriggerKind::Schedule {
                    continue;
                }
                let Some(expr) = trigger.config.schedule.as_deref() else {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        trigger_id = %trigger.id,
                        "schedule trigger has no cron expression"
                    );
                    continue;
                };
                match Self::parse_cron(expr) {
                    Ok(schedule) => triggers.push(ScheduledTrigger {
                        workflow: workflow.clone(),
                        trigger: trigger.clone(),
                        schedule,
                    }),
                    Err(e) => tracing::warn!(
                        workflow_id = %workflow.id,
                        trigger_id = %trigger.id,
                        error = %e,
                        "skipping schedule trigger"
                    ),
                }
            }
        }
        Self { triggers }
    }

    /// Parse a cron expression string into a [`cron::Schedule`].
    ///
    /// Uses the 7-field cron format: sec min hour day-of-month month day-of-week year.
    pub fn parse_cron(cron_expr: &str) -> ConclaveResult<Schedule> {
        Schedule::from_str(cron_expr).map_err(|e| {
            ConclaveError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
        })
    }

    /// First upcoming fire time after now.
    pub fn next_fire_time(cron_expr: &str) -> ConclaveResult<DateTime<Utc>> {
        let schedule = Self::parse_cron(cron_expr)?;
        schedule.upcoming(Utc).next().ok_or_else(|| {
            ConclaveError::Config(format!(
                "Cron expression '{cron_expr}' has no upcoming fire times"
            ))
        })
    }

    pub fn triggers(&self) -> &[ScheduledTrigger] {
        &self.triggers
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Start the background loop.
    ///
    /// Each pass sleeps until the nearest fire time, then starts every
    /// trigger due within a one-second window.
    pub fn start(self, engine: Arc<WorkflowEngine>, events: OrchestratorBus) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let upcoming: Vec<(&ScheduledTrigger, DateTime<Utc>)> = self
                    .triggers
                    .iter()
                    .filter_map(|t| t.next_fire_time().map(|at| (t, at)))
                    .collect();

                let Some(nearest) = upcoming.iter().map(|(_, at)| *at).min() else {
                    tracing::info!("TriggerScheduler: nothing scheduled, sleeping 60s");
                    tokio::time::sleep(IDLE_SLEEP).await;
                    continue;
                };

                let now = Utc::now();
                if nearest > now {
                    let wait = (nearest - now).to_std().unwrap_or_default();
                    tracing::debug!(?wait, "TriggerScheduler: sleeping until next trigger");
                    tokio::time::sleep(wait).await;
                }

                let threshold = Utc::now() + chrono::Duration::seconds(1);
                for (scheduled, fire_time) in &upcoming {
                    if *fire_time > threshold {
                        continue;
                    }
                    fire(&engine, &events, scheduled).await;
                }

                // Step past the window just served so the same slot is not fired twice.
                let after = nearest + chrono::Duration::seconds(1) - Utc::now();
                if let Ok(rest) = after.to_std() {
                    tokio::time::sleep(rest).await;
                }
            }
        })
    }
}

async fn fire(engine: &Arc<WorkflowEngine>, events: &OrchestratorBus, scheduled: &ScheduledTrigger) {
    let workflow = &scheduled.workflow;
    let variables: JsonMap = workflow.variables.clone();
    match engine.execute_workflow(workflow.clone(), variables).await {
        Ok(execution_id) => {
            tracing::info!(
                workflow_id = %workflow.id,
                trigger_id = %scheduled.trigger.id,
                %execution_id,
                "schedule trigger fired"
            );
            events.publish(OrchestratorEvent::WorkflowTriggered {
                workflow_id: workflow.id.clone(),
                trigger_id: scheduled.trigger.id.clone(),
                execution_id,
            });
        }
        Err(e) => tracing::warn!(
            workflow_id = %workflow.id,
            trigger_id = %scheduled.trigger.id,
            error = %e,
            "schedule trigger could not start workflow"
        ),
    }
}
