use crate::store::{merge_patch, DurableStore};
use async_trait::async_trait;
use conclave_core::ConclaveResult;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    keyed: HashMap<String, HashMap<String, Value>>,
    logs: HashMap<String, Vec<Value>>,
}

/// Process-local [`DurableStore`]. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every keyed record in `table`, in no particular order.
    pub async fn records(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.read().await;
        tables
            .keyed
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every appended record in `table`, in insertion order.
    pub async fn log(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.read().await;
        tables.logs.get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn upsert(&self, table: &str, id: &str, record: &Value) -> ConclaveResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .keyed
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn insert(&self, table: &str, record: &Value) -> ConclaveResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .logs
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, patch: &Value) -> ConclaveResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(record) = tables.keyed.get_mut(table).and_then(|t| t.get_mut(id)) {
            merge_patch(record, patch);
        }
        Ok(())
    }

    async fn get(&self, table: &str, id: &str) -> ConclaveResult<Option<Value>> {
        let tables = self.tables.read().await;
        Ok(tables.keyed.get(table).and_then(|t| t.get(id)).cloned())
    }
}
