use crate::events::{OrchestratorBus, OrchestratorEvent};
use crate::mirror::{StoreMirror, EVENTS_TABLE};
use chrono::{DateTime, Utc};
use conclave_core::{Event, EventBusError};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One row of the `events` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry<'a> {
    pub timestamp: DateTime<Utc>,
    pub name: &'static str,
    #[serde(flatten)]
    pub event: &'a OrchestratorEvent,
}

/// Append-only audit trail: a background task mirrors every published event
/// into the durable store.
pub struct AuditTrail {
    handle: JoinHandle<()>,
}

impl AuditTrail {
    /// Subscribe to `events` and start writing. Events published before this
    /// call are not recorded.
    pub fn spawn(events: &OrchestratorBus, mirror: StoreMirror) -> Self {
        let mut rx = events.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let entry = AuditEntry {
                            timestamp: Utc::now(),
                            name: event.name(),
                            event: &event,
                        };
                        debug!(event = entry.name, "audit");
                        mirror.insert(EVENTS_TABLE, &entry).await;
                    }
                    Err(EventBusError::Lagged(n)) => {
                        warn!(skipped = n, "audit trail fell behind, events not recorded");
                    }
                    Err(_) => break,
                }
            }
        });
        Self { handle }
    }

    /// Stop recording.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for AuditTrail {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
