//! Persistence collaborator for recovered records
//!
//! Storage is best-effort and fire-and-forget: a failed write is logged
//! and never propagated back into the pipeline.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

use crate::{Record, Result};

/// Accepts a final recovered record list for storage
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one batch of records under a caller-chosen label
    async fn persist(&self, label: &str, records: &[Record]) -> Result<()>;
}

/// Stores each batch as one timestamped JSON file in a base directory
pub struct JsonDirStore {
    base_dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl RecordStore for JsonDirStore {
    async fn persist(&self, label: &str, records: &[Record]) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;

        let filename = format!("{}-{}.json", label, Utc::now().format("%Y%m%dT%H%M%S%3f"));
        let path = self.base_dir.join(filename);
        let json = serde_json::to_vec_pretty(records)?;
        fs::write(&path, json).await?;

        tracing::debug!(
            "Persisted {} records to {}",
            records.len(),
            path.display()
        );
        Ok(())
    }
}

/// Fire-and-forget persistence: spawn the write and log any failure
pub fn persist_detached(store: Arc<dyn RecordStore>, label: String, records: Vec<Record>) {
    tokio::spawn(async move {
        if let Err(e) = store.persist(&label, &records).await {
            tracing::warn!("Failed to persist {} records ({}): {}", records.len(), label, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_persist_writes_one_file_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());

        let records = vec![
            Record::from_value(json!({"key": "a", "question": "Q?"})).unwrap(),
            Record::from_value(json!({"key": "b", "question": "Q2?"})).unwrap(),
        ];
        store.persist("questions", &records).await.unwrap();

        let mut entries = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect::<Vec<_>>();
        assert_eq!(entries.len(), 1);

        let content = std::fs::read_to_string(entries.pop().unwrap()).unwrap();
        let parsed: Vec<Record> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, records);
    }

    #[tokio::test]
    async fn test_persist_detached_swallows_failures() {
        // Point the store at a path that cannot be a directory
        let file = tempfile::NamedTempFile::new().unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(JsonDirStore::new(file.path()));

        persist_detached(store, "questions".into(), vec![]);
        // Nothing to assert beyond "does not panic or propagate"
        tokio::task::yield_now().await;
    }
}
