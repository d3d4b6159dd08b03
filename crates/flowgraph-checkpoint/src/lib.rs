//! Checkpoint store contract and in-memory reference implementation for
//! `flowgraph`.
//!
//! This crate is deliberately small and has no dependency on
//! `flowgraph-core`: it defines the storage-side half of the checkpoint
//! protocol so that a durable backend (Postgres, SQLite, an object store)
//! can be implemented against it without pulling in the graph execution
//! engine.
//!
//! # Contents
//!
//! - [`CheckpointRecord`] / [`CheckpointInfo`] — the wire record and its
//!   lightweight listing projection.
//! - [`CheckpointStore`] — the trait the execution core's checkpoint
//!   manager and resume coordinator consume.
//! - [`InMemoryCheckpointStore`] — a `HashMap`-backed reference
//!   implementation for tests, demos, and short-lived runs.

mod error;
mod memory;
mod record;
mod store;

pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use record::{CheckpointInfo, CheckpointRecord, CHECKPOINT_VERSION};
pub use store::CheckpointStore;
