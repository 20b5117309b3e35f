use chrono::Utc;
use conclave_store::DurableStore;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub const AGENTS_TABLE: &str = "agents";
pub const TASKS_TABLE: &str = "tasks";
pub const MESSAGES_TABLE: &str = "agent_messages";
pub const EVENTS_TABLE: &str = "events";

/// Best-effort persistence of in-memory state.
///
/// Every write stamps `updatedAt`. Failures are logged and swallowed: the
/// in-memory state is authoritative and never rolled back.
#[derive(Clone)]
pub struct StoreMirror {
    store: Arc<dyn DurableStore>,
}

impl StoreMirror {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    pub async fn upsert<T: Serialize>(&self, table: &str, id: &str, entity: &T) {
        let Some(record) = stamped(table, entity) else {
            return;
        };
        if let Err(e) = self.store.upsert(table, id, &record).await {
            warn!(table, id, error = %e, "store upsert failed");
        }
    }

    pub async fn insert<T: Serialize>(&self, table: &str, entity: &T) {
        let Some(record) = stamped(table, entity) else {
            return;
        };
        if let Err(e) = self.store.insert(table, &record).await {
            warn!(table, error = %e, "store insert failed");
        }
    }

    pub async fn update(&self, table: &str, id: &str, mut patch: Value) {
        if let Value::Object(map) = &mut patch {
            map.insert("updatedAt".into(), Value::String(Utc::now().to_rfc3339()));
        }
        if let Err(e) = self.store.update(table, id, &patch).await {
            warn!(table, id, error = %e, "store update failed");
        }
    }
}

fn stamped<T: Serialize>(table: &str, entity: &T) -> Option<Value> {
    match serde_json::to_value(entity) {
        Ok(mut record) => {
            if let Value::Object(map) = &mut record {
                map.insert("updatedAt".into(), Value::String(Utc::now().to_rfc3339()));
            }
            Some(record)
        }
        Err(e) => {
            warn!(table, error = %e, "could not serialize record for store");
            None
        }
    }
}
