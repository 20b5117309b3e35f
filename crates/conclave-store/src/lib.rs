//! Durable store abstraction used to mirror orchestration state.
//!
//! Writes are best-effort from the caller's point of view: the orchestrator
//! logs and swallows store failures, so implementations only need to report
//! them faithfully.

/// In-memory store, used by tests and ephemeral runs.
pub mod memory;
/// The [`DurableStore`] trait and the JSON-file implementation.
pub mod store;

pub use memory::MemoryStore;
pub use store::{DurableStore, FileStore};
