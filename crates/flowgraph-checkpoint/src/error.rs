//! Error types for checkpoint store operations.

use thiserror::Error;

/// Result type for checkpoint store operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while saving, loading, or deleting checkpoints.
///
/// A checkpoint store implementation is expected to map its own backend
/// errors (a database driver error, an I/O error) onto [`CheckpointError::Storage`]
/// and to use [`CheckpointError::NotFound`] for the single distinguished
/// "no such record" condition the resume coordinator relies on to detect
/// an empty run.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the requested `(run_id, node_id)` pair, or
    /// no checkpoints at all exist for the requested run.
    #[error("checkpoint not found: run_id={run_id}, node_id={node_id:?}")]
    NotFound {
        /// Run the lookup was scoped to.
        run_id: String,
        /// Specific node looked up, if any (`None` for "latest for run").
        node_id: Option<String>,
    },

    /// The state value could not be serialized into the checkpoint's wire
    /// format.
    #[error("failed to serialize checkpoint state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The state bytes stored in a checkpoint could not be deserialized
    /// back into the caller's state type.
    #[error("failed to deserialize checkpoint state: {0}")]
    Deserialize(String),

    /// The compressed (bincode) form of a checkpoint record could not be
    /// encoded or decoded.
    #[error("binary (de)serialization error: {0}")]
    BinaryCodec(#[from] bincode::Error),

    /// The backing store rejected or failed the operation (I/O failure,
    /// connection error, constraint violation, ...).
    #[error("checkpoint store error: {0}")]
    Storage(String),

    /// A record retrieved from the store failed a structural sanity check
    /// (unknown version, missing required field after decode, ...).
    #[error("invalid checkpoint record: {0}")]
    Invalid(String),
}
