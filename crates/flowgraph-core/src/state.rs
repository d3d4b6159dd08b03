//! State cloning and merging across a parallel fork/join region.
//!
//! A user's state type may opt into exact control over branch independence
//! and merge semantics, or fall back to a structural serialize/deserialize
//! round trip. Rust has no trait-presence reflection (no specialization on
//! stable), so the two paths can't be dispatched automatically at a single
//! call site — see [`ParallelState`]'s doc comment for the resolution
//! recorded in `DESIGN.md`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{FlowError, Result};
use crate::ids::NodeId;

/// Capability controlling how a state value is cloned for each fork branch
/// and recombined at the join.
///
/// Both methods are fully defaulted, so the common case is a one-line opt
/// in:
///
/// ```
/// # use flowgraph_core::state::ParallelState;
/// #[derive(Clone)]
/// struct Counter { value: i64 }
/// impl ParallelState for Counter {}
/// ```
///
/// The default `fork_clone` is a plain [`Clone::clone`] — correct as long
/// as `S` owns its data outright. If `S` holds shared mutable sub-objects
/// (an `Rc`/`Arc`-wrapped cache, an interior-mutable handle), override
/// `fork_clone` to call [`clone_via_json`] instead, which round-trips
/// through the same serialization format used for checkpoints and
/// guarantees branch independence at the cost of a copy.
///
/// The default `merge_branches` returns the original fork-entry state
/// unchanged — a documented limitation for callers who supply no real
/// merge logic; the intended place for a custom merge in that case is the
/// branch hook's `on_join`, not this trait.
///
/// `run`/`resume` require `S: ParallelState` (see their `where` clauses),
/// but [`crate::graph::GraphBuilder`], [`crate::compiled::CompiledGraph`]
/// construction, and introspection do not — a caller who only builds,
/// compiles, and visualizes a graph never needs this bound.
pub trait ParallelState: Clone + Send + Sync + 'static {
    /// Produce an independent copy of `self` for branch `branch_id`.
    fn fork_clone(&self, branch_id: &str) -> Self {
        let _ = branch_id;
        self.clone()
    }

    /// Combine the final state of every branch into the state the join
    /// node observes. `original` is the state as of the fork node, before
    /// any branch ran.
    fn merge_branches(original: &Self, branches: &BranchStates<Self>) -> Self {
        let _ = branches;
        original.clone()
    }
}

/// Clones `value` via a JSON round trip rather than [`Clone::clone`],
/// guaranteeing the result shares no interior-mutable or reference-counted
/// state with the original.
///
/// Not invoked automatically — call it from a [`ParallelState::fork_clone`]
/// override. Failure (a type that serializes asymmetrically, or a custom
/// `Deserialize` that rejects its own output) is reported as
/// [`FlowError::SerializeState`] / [`FlowError::DeserializeState`].
pub fn clone_via_json<S: Serialize + DeserializeOwned>(value: &S) -> Result<S> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| FlowError::SerializeState(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| FlowError::DeserializeState(e.to_string()))
}

/// The final state of every branch of a completed fork region, keyed by
/// branch entry node id.
///
/// Passed to [`ParallelState::merge_branches`] and to a branch hook's
/// `on_join`, which sees exactly one entry per branch, keyed by branch
/// entry id, when every branch succeeds under `fail_fast=false`.
#[derive(Debug, Clone)]
pub struct BranchStates<S> {
    states: HashMap<NodeId, S>,
}

impl<S> BranchStates<S> {
    pub(crate) fn new(states: HashMap<NodeId, S>) -> Self {
        Self { states }
    }

    /// Number of branches represented.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True if no branch states are present.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The final state of a specific branch, if it succeeded.
    pub fn get(&self, branch_id: &str) -> Option<&S> {
        self.states.get(branch_id)
    }

    /// Iterate branch id / final state pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &S)> {
        self.states.iter()
    }

    /// Consume into the underlying map.
    pub fn into_map(self) -> HashMap<NodeId, S> {
        self.states
    }
}
