//! The on-disk / on-wire checkpoint record.
//!
//! A [`CheckpointRecord`] is written by the execution engine once per
//! successfully-completed node. It is deliberately flat: one record per
//! `(run_id, node_id)` pair, identified and overwritten in place on
//! re-execution, rather than the versioned-channel snapshot model used by
//! systems that checkpoint an entire Pregel superstep. flowgraph's executor
//! is single-node-at-a-time in its sequential region, so a per-node record
//! is sufficient to resume correctly (see `flowgraph-core::resume`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current checkpoint record schema version.
///
/// Bumped whenever the wire shape of [`CheckpointRecord`] changes in a way
/// that is not forward-compatible. The resume coordinator refuses to load
/// a record whose `version` does not match.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A durable record of one completed node execution.
///
/// Records are content-addressed by `(run_id, node_id)`: re-executing a
/// node (e.g. during a replay) overwrites its prior record rather than
/// appending a new one. `sequence` is the total ordering that lets a
/// resume coordinator find "the last thing that happened" independent of
/// node identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointRecord {
    /// Schema version this record was written with.
    pub version: u32,
    /// Caller-supplied run identifier this record belongs to.
    pub run_id: String,
    /// Node whose completion this record captures.
    pub node_id: String,
    /// Node executed immediately before `node_id` in this run, if any.
    pub prev_node_id: Option<String>,
    /// Monotonically increasing sequence number, unique per run.
    pub sequence: u64,
    /// Wall-clock time the record was written, UTC.
    pub timestamp: DateTime<Utc>,
    /// Routing decision computed after `node_id` completed: the next node
    /// to execute, or `None` to denote `END`.
    pub next_node_id: Option<String>,
    /// Which attempt at executing `node_id` produced this record (starts
    /// at 1; flowgraph itself never retries a node, but a caller-composed
    /// retry wrapper around a node function may increment this via the
    /// execution context).
    pub attempt: u32,
    /// The serialized state value, opaque to the checkpoint store.
    pub state: Vec<u8>,
    /// Whether `state` is bincode-compressed rather than raw JSON bytes.
    ///
    /// Set automatically by the checkpoint manager when a serialized
    /// state exceeds the compression threshold (1 MiB by default); see
    /// `flowgraph_core::checkpoint_manager`.
    pub compressed: bool,
}

impl CheckpointRecord {
    /// Identifier this record is stored and looked up under.
    pub fn key(&self) -> (String, String) {
        (self.run_id.clone(), self.node_id.clone())
    }
}

/// Lightweight metadata about a stored checkpoint, returned by
/// [`CheckpointStore::list`](crate::store::CheckpointStore::list) without
/// paying the cost of deserializing every state blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Run the checkpoint belongs to.
    pub run_id: String,
    /// Node the checkpoint was written for.
    pub node_id: String,
    /// Sequence number, used to order checkpoints within a run.
    pub sequence: u64,
    /// Wall-clock write time.
    pub timestamp: DateTime<Utc>,
    /// Size in bytes of the serialized state payload.
    pub size: usize,
}

impl From<&CheckpointRecord> for CheckpointInfo {
    fn from(record: &CheckpointRecord) -> Self {
        CheckpointInfo {
            run_id: record.run_id.clone(),
            node_id: record.node_id.clone(),
            sequence: record.sequence,
            timestamp: record.timestamp,
            size: record.state.len(),
        }
    }
}
