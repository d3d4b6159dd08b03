//! Checkpoint writing and (de)serialization of state values.
//!
//! Serialization is JSON by default for human-readable debuggability, with
//! `bincode` compression above a 1 MiB threshold. This module only handles
//! the state <-> bytes boundary and the single `save` call; sequencing,
//! `next_node_id` computation, and the fatal-vs-log-and-continue policy
//! live in the sequential executor, which is the only caller that knows
//! where it is in the run.

use chrono::Utc;
use flowgraph_checkpoint::{CheckpointRecord, CheckpointStore, CHECKPOINT_VERSION};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FlowError, Result};
use crate::ids::NodeId;

/// State payloads larger than this are bincode-compressed before storage.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 1024 * 1024;

/// Serialize `state` to its checkpoint wire form, compressing if it
/// exceeds [`COMPRESSION_THRESHOLD_BYTES`].
pub(crate) fn serialize_state<S: Serialize>(node_id: &str, state: &S) -> Result<(Vec<u8>, bool)> {
    let json = serde_json::to_vec(state).map_err(|e| FlowError::CheckpointError {
        node_id: node_id.to_string(),
        op: "serialize",
        cause: e.to_string(),
    })?;

    if json.len() > COMPRESSION_THRESHOLD_BYTES {
        let compressed = bincode::serialize(&json).map_err(|e| FlowError::CheckpointError {
            node_id: node_id.to_string(),
            op: "serialize",
            cause: e.to_string(),
        })?;
        Ok((compressed, true))
    } else {
        Ok((json, false))
    }
}

/// Inverse of [`serialize_state`].
pub(crate) fn deserialize_state<S: DeserializeOwned>(
    node_id: &str,
    bytes: &[u8],
    compressed: bool,
) -> Result<S> {
    let json_bytes: std::borrow::Cow<'_, [u8]> = if compressed {
        let decompressed: Vec<u8> = bincode::deserialize(bytes).map_err(|e| FlowError::DeserializeState(format!(
            "node {node_id:?}: failed to decompress checkpoint state: {e}"
        )))?;
        std::borrow::Cow::Owned(decompressed)
    } else {
        std::borrow::Cow::Borrowed(bytes)
    };

    serde_json::from_slice(&json_bytes)
        .map_err(|e| FlowError::DeserializeState(format!("node {node_id:?}: {e}")))
}

/// Build and persist one checkpoint record. Sequence
/// numbering is the caller's responsibility — this function writes
/// exactly the record it's given.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn write_checkpoint<S: Serialize>(
    store: &dyn CheckpointStore,
    run_id: &str,
    node_id: &NodeId,
    prev_node_id: Option<&NodeId>,
    next_node_id: Option<&NodeId>,
    sequence: u64,
    attempt: u32,
    state: &S,
) -> Result<()> {
    let (bytes, compressed) = serialize_state(node_id, state)?;
    let record = CheckpointRecord {
        version: CHECKPOINT_VERSION,
        run_id: run_id.to_string(),
        node_id: node_id.clone(),
        prev_node_id: prev_node_id.cloned(),
        sequence,
        timestamp: Utc::now(),
        next_node_id: next_node_id.cloned(),
        attempt,
        state: bytes,
        compressed,
    };

    store.save(record).await.map_err(|e| FlowError::CheckpointError {
        node_id: node_id.clone(),
        op: "save",
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        value: i64,
    }

    #[test]
    fn small_state_is_not_compressed() {
        let (bytes, compressed) = serialize_state("a", &Sample { value: 1 }).unwrap();
        assert!(!compressed);
        let restored: Sample = deserialize_state("a", &bytes, compressed).unwrap();
        assert_eq!(restored, Sample { value: 1 });
    }

    #[test]
    fn large_state_is_compressed_and_round_trips() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Big {
            blob: String,
        }
        let big = Big { blob: "x".repeat(COMPRESSION_THRESHOLD_BYTES + 1) };
        let (bytes, compressed) = serialize_state("a", &big).unwrap();
        assert!(compressed);
        let restored: Big = deserialize_state("a", &bytes, compressed).unwrap();
        assert_eq!(restored, big);
    }
}
