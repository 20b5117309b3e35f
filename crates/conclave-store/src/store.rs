use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Keyed record storage, grouped into named tables.
///
/// `upsert` writes a whole record, `update` shallow-merges a JSON object patch
/// into an existing record (a missing record is left alone), and `insert`
/// appends to an append-only table.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or replace the record stored under `id`.
    async fn upsert(&self, table: &str, id: &str, record: &Value) -> ConclaveResult<()>;

    /// Append a record to an append-only table.
    async fn insert(&self, table: &str, record: &Value) -> ConclaveResult<()>;

    /// Merge the top-level fields of `patch` into the record stored under `id`.
    async fn update(&self, table: &str, id: &str, patch: &Value) -> ConclaveResult<()>;

    /// Load the record stored under `id`.
    async fn get(&self, table: &str, id: &str) -> ConclaveResult<Option<Value>>;
}

/// Shallow-merge `patch` into `target`. Non-object patches replace the target.
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

/// File-based store: one JSON file per keyed record, one JSONL file per
/// append-only table.
///
/// Layout under the root directory:
/// - `<table>/<id>.json` for `upsert` / `update`
/// - `<table>.jsonl` for `insert`
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> ConclaveResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn record_path(&self, table: &str, id: &str) -> PathBuf {
        self.dir
            .join(encode_name(table))
            .join(format!("{}.json", encode_name(id)))
    }

    fn log_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", encode_name(table)))
    }

    /// Read every line of an append-only table.
    pub async fn read_log(&self, table: &str) -> ConclaveResult<Vec<Value>> {
        let path = self.log_path(table);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(path).await?;
        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(ConclaveError::from))
            .collect()
    }
}

/// Portable, reversible file name: `[A-Za-z0-9_-]` is kept and every other
/// byte becomes `%XX`, so distinct ids never share a file.
fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[async_trait]
impl DurableStore for FileStore {
    async fn upsert(&self, table: &str, id: &str, record: &Value) -> ConclaveResult<()> {
        let path = self.record_path(table, id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, record: &Value) -> ConclaveResult<()> {
        let line = format!("{}\n", serde_json::to_string(record)?);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(table))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, patch: &Value) -> ConclaveResult<()> {
        let Some(mut record) = self.get(table, id).await? else {
            debug!(table, id, "update skipped: no such record");
            return Ok(());
        };
        merge_patch(&mut record, patch);
        self.upsert(table, id, &record).await
    }

    async fn get(&self, table: &str, id: &str) -> ConclaveResult<Option<Value>> {
        let path = self.record_path(table, id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let record = serde_json::from_str(&data)
            .map_err(|e| ConclaveError::Store(format!("Failed to parse {table}/{id}: {e}")))?;
        Ok(Some(record))
    }
}
