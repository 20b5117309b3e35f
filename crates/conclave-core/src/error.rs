use thiserror::Error;

/// A convenience `Result` alias using [`ConclaveError`].
pub type ConclaveResult<T> = Result<T, ConclaveError>;

/// Top-level error type for the Conclave workspace.
///
/// Each variant corresponds to a subsystem that can produce errors. Messages
/// are human-readable; no structured error codes are carried.
#[derive(Error, Debug)]
pub enum ConclaveError {
    /// No idle agent declares every capability a task requires.
    #[error("No suitable agent found for task: {0}")]
    AgentUnavailable(String),

    /// A task handler failed while executing against an oracle.
    #[error("Execution error: {0}")]
    Execution(String),

    /// An outbound HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A completion or retrieval oracle returned an unusable response.
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// A durable-store write or read failed.
    #[error("Store error: {0}")]
    Store(String),

    /// The outbound webhook notifier failed.
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// A workflow definition or step failed.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Configuration could not be parsed or validated.
    #[error("Config error: {0}")]
    Config(String),

    /// Scheduler or engine bookkeeping error.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConclaveError {
    /// True when no agent could take the task, as opposed to a handler
    /// failure. Both count against the task's attempts.
    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, ConclaveError::AgentUnavailable(_))
    }
}
