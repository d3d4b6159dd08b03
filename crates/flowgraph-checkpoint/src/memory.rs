//! In-memory reference implementation of [`CheckpointStore`].
//!
//! A `Mutex`-guarded map keyed by run id, suitable for development,
//! tests, and short-lived single-process workflows. Nothing is persisted
//! across process restarts.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CheckpointError, Result};
use crate::record::{CheckpointInfo, CheckpointRecord};
use crate::store::CheckpointStore;

/// A `CheckpointStore` backed by an in-process `HashMap`.
///
/// Use this for tests, demos, and any workflow that does not need to
/// survive a process restart. Reach for a durable `CheckpointStore`
/// implementation (SQL-backed, object-storage-backed, ...) for anything
/// else; this crate intentionally does not ship one.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    // run_id -> node_id -> record
    records: Mutex<HashMap<String, HashMap<String, CheckpointRecord>>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every record from every run. Intended for test isolation
    /// between cases that share a store instance.
    pub fn clear(&self) {
        self.records.lock().expect("checkpoint store lock poisoned").clear();
    }

    /// Number of runs with at least one stored checkpoint.
    pub fn run_count(&self) -> usize {
        self.records.lock().expect("checkpoint store lock poisoned").len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, record: CheckpointRecord) -> Result<()> {
        let mut guard = self.records.lock().expect("checkpoint store lock poisoned");
        guard
            .entry(record.run_id.clone())
            .or_default()
            .insert(record.node_id.clone(), record);
        Ok(())
    }

    async fn load(&self, run_id: &str, node_id: &str) -> Result<CheckpointRecord> {
        let guard = self.records.lock().expect("checkpoint store lock poisoned");
        guard
            .get(run_id)
            .and_then(|run| run.get(node_id))
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound {
                run_id: run_id.to_string(),
                node_id: Some(node_id.to_string()),
            })
    }

    async fn list(&self, run_id: &str) -> Result<Vec<CheckpointInfo>> {
        let guard = self.records.lock().expect("checkpoint store lock poisoned");
        let mut infos: Vec<CheckpointInfo> = guard
            .get(run_id)
            .map(|run| run.values().map(CheckpointInfo::from).collect())
            .unwrap_or_default();
        infos.sort_by_key(|i| i.sequence);
        Ok(infos)
    }

    async fn delete(&self, run_id: &str, node_id: &str) -> Result<()> {
        let mut guard = self.records.lock().expect("checkpoint store lock poisoned");
        if let Some(run) = guard.get_mut(run_id) {
            run.remove(node_id);
        }
        Ok(())
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        let mut guard = self.records.lock().expect("checkpoint store lock poisoned");
        guard.remove(run_id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_record(run_id: &str, node_id: &str, sequence: u64) -> CheckpointRecord {
        CheckpointRecord {
            version: crate::record::CHECKPOINT_VERSION,
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            prev_node_id: None,
            sequence,
            timestamp: Utc::now(),
            next_node_id: Some("b".to_string()),
            attempt: 1,
            state: b"{}".to_vec(),
            compressed: false,
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryCheckpointStore::new();
        let record = sample_record("run-1", "a", 1);
        store.save(record.clone()).await.unwrap();
        let loaded = store.load("run-1", "a").await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn load_missing_returns_not_found() {
        let store = InMemoryCheckpointStore::new();
        let err = store.load("run-1", "a").await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound { .. }));
    }

    #[tokio::test]
    async fn re_execution_overwrites_same_node() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample_record("run-1", "a", 1)).await.unwrap();
        store.save(sample_record("run-1", "a", 2)).await.unwrap();
        let infos = store.list("run-1").await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].sequence, 2);
    }

    #[tokio::test]
    async fn list_orders_by_sequence() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample_record("run-1", "b", 2)).await.unwrap();
        store.save(sample_record("run-1", "a", 1)).await.unwrap();
        store.save(sample_record("run-1", "c", 3)).await.unwrap();
        let infos = store.list("run-1").await.unwrap();
        let sequences: Vec<u64> = infos.iter().map(|i| i.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn load_latest_picks_highest_sequence() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample_record("run-1", "a", 1)).await.unwrap();
        store.save(sample_record("run-1", "b", 2)).await.unwrap();
        let latest = store.load_latest("run-1").await.unwrap();
        assert_eq!(latest.node_id, "b");
    }

    #[tokio::test]
    async fn delete_run_clears_all_records() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample_record("run-1", "a", 1)).await.unwrap();
        store.save(sample_record("run-1", "b", 2)).await.unwrap();
        store.delete_run("run-1").await.unwrap();
        assert_eq!(store.list("run-1").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn runs_are_isolated() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample_record("run-1", "a", 1)).await.unwrap();
        store.save(sample_record("run-2", "a", 1)).await.unwrap();
        store.delete_run("run-1").await.unwrap();
        assert_eq!(store.list("run-1").await.unwrap().len(), 0);
        assert_eq!(store.list("run-2").await.unwrap().len(), 1);
    }
}
