//! The [`CheckpointStore`] trait — the storage backend contract consumed
//! by flowgraph's checkpoint manager and resume coordinator.
//!
//! This is a narrow interface: the execution core only ever calls these
//! six methods. Concrete backends (SQL, Redis, a managed service) are out
//! of scope for this crate; implement this trait for them.
//!
//! # Implementing a custom backend
//!
//! ```rust,ignore
//! use flowgraph_checkpoint::{CheckpointStore, CheckpointRecord, CheckpointInfo, Result};
//! use async_trait::async_trait;
//!
//! struct PostgresStore { /* pool, etc. */ }
//!
//! #[async_trait]
//! impl CheckpointStore for PostgresStore {
//!     async fn save(&self, record: CheckpointRecord) -> Result<()> {
//!         // INSERT ... ON CONFLICT (run_id, node_id) DO UPDATE ...
//!         todo!()
//!     }
//!     async fn load(&self, run_id: &str, node_id: &str) -> Result<CheckpointRecord> {
//!         todo!()
//!     }
//!     async fn list(&self, run_id: &str) -> Result<Vec<CheckpointInfo>> {
//!         todo!()
//!     }
//!     async fn delete(&self, run_id: &str, node_id: &str) -> Result<()> {
//!         todo!()
//!     }
//!     async fn delete_run(&self, run_id: &str) -> Result<()> {
//!         todo!()
//!     }
//!     async fn close(&self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::Result;
use crate::record::{CheckpointInfo, CheckpointRecord};
use async_trait::async_trait;

/// Storage backend contract for checkpoint records.
///
/// Implementations must be safe for concurrent use by multiple runs with
/// distinct `run_id`s; the execution engine never issues concurrent
/// writes for the same `(run_id, node_id)` pair, so implementations are
/// not required to serialize writes beyond what is needed for that
/// guarantee.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `record`, overwriting any prior record with the same
    /// `(run_id, node_id)` key.
    async fn save(&self, record: CheckpointRecord) -> Result<()>;

    /// Load the record for a specific `(run_id, node_id)` pair.
    ///
    /// Returns [`CheckpointError::NotFound`](crate::error::CheckpointError::NotFound)
    /// if no such record exists.
    async fn load(&self, run_id: &str, node_id: &str) -> Result<CheckpointRecord>;

    /// List metadata for every checkpoint of `run_id`, ordered by
    /// ascending `sequence`.
    ///
    /// Returns an empty vector (not an error) if the run has no
    /// checkpoints; the resume coordinator is responsible for treating an
    /// empty list as [`CheckpointError::NotFound`] where that is the
    /// appropriate signal.
    async fn list(&self, run_id: &str) -> Result<Vec<CheckpointInfo>>;

    /// Delete the record for a specific `(run_id, node_id)` pair, if any.
    async fn delete(&self, run_id: &str, node_id: &str) -> Result<()>;

    /// Delete every record belonging to `run_id`.
    async fn delete_run(&self, run_id: &str) -> Result<()>;

    /// Release any resources (connections, file handles) held by the
    /// store. The default implementation is a no-op, suitable for
    /// in-memory or connection-pooled backends that manage their own
    /// lifecycle.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Convenience built on [`list`](Self::list): load the
    /// highest-`sequence` record for `run_id`.
    async fn load_latest(&self, run_id: &str) -> Result<CheckpointRecord> {
        let mut infos = self.list(run_id).await?;
        infos.sort_by_key(|i| i.sequence);
        let latest = infos
            .pop()
            .ok_or_else(|| crate::error::CheckpointError::NotFound {
                run_id: run_id.to_string(),
                node_id: None,
            })?;
        self.load(run_id, &latest.node_id).await
    }
}
