use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime knobs for an [`Orchestrator`](crate::Orchestrator), read from the
/// `[orchestrator]` table of `conclave.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Where workflow-start notifications and webhook steps are posted.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Period of the safety-net queue drain.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Delay before a failed workflow step is retried.
    #[serde(default = "default_step_retry_delay_ms")]
    pub step_retry_delay_ms: u64,
    /// Events buffered per subscriber before slow receivers start lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_drain_interval_ms() -> u64 {
    5000
}

fn default_step_retry_delay_ms() -> u64 {
    5000
}

fn default_event_capacity() -> usize {
    1000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            drain_interval_ms: default_drain_interval_ms(),
            step_retry_delay_ms: default_step_retry_delay_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl OrchestratorConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn step_retry_delay(&self) -> Duration {
        Duration::from_millis(self.step_retry_delay_ms)
    }
}
