//! Core types shared across the Conclave crates.
//!
//! # Main types
//!
//! - [`ConclaveError`]: Unified error enum for all Conclave subsystems.
//! - [`ConclaveResult`]: Convenience alias for `Result<T, ConclaveError>`.
//! - [`EventBus`]: Broadcast bus carrying named domain events to subscribers.
//! - [`Event`]: Trait implemented by every event type published on the bus.

/// Unified error type.
pub mod error;
/// Broadcast event bus.
pub mod events;

pub use error::{ConclaveError, ConclaveResult};
pub use events::{Event, EventBus, EventBusError, EventReceiver};
