//! Node and router function shapes, and the branch hook interface.
//!
//! A node function is a deterministic-ish transformation from
//! `(Context, S) -> (S, error)`; a router is `(Context, S) ->
//! node-id-or-END`. Both are async and boxed as `Fn(state) -> Pin<Box<dyn
//! Future<Output = Result<...>> + Send>>` closures so a builder can hold
//! a heterogeneous collection of them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::ids::NodeId;
use crate::state::BranchStates;

/// Boxed future type used throughout the crate for node and router bodies.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type a node function may return, distinct from [`crate::error::FlowError`]
/// since node bodies are user code and shouldn't need to depend on this
/// crate's error enum just to report a failure.
pub type NodeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by a node function body.
pub type NodeOutcome<S> = std::result::Result<S, NodeError>;

/// A node function: `(context, state) -> next state`, boxed as a trait
/// object so a [`crate::graph::GraphBuilder`] can hold a heterogeneous
/// collection of them.
pub type NodeFn<S> = Arc<dyn Fn(ExecutionContext, S) -> BoxFuture<'static, NodeOutcome<S>> + Send + Sync>;

/// A router function: `(context, state) -> next node id (or END)`.
///
/// Returns a bare `String` rather than a `Result` — there are only two
/// failure shapes for a router's *result* (empty, unknown id), both of
/// which the executor detects from the value itself; a router whose own
/// logic needs to signal failure does so the same way a node does, by
/// panicking (caught at the same per-node boundary).
pub type RouterFn<S> = Arc<dyn Fn(ExecutionContext, S) -> BoxFuture<'static, String> + Send + Sync>;

/// Hooks the parallel executor invokes around a fork/join region. All
/// methods are optional to override; the defaults are no-ops.
#[async_trait]
pub trait BranchHook<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// Called once per branch immediately after state cloning, before the
    /// branch worker is dispatched. An error aborts the entire fork; any
    /// branches already dispatched are cancelled.
    async fn on_fork(&self, ctx: &ExecutionContext, branch_id: &str, state: S) -> Result<S> {
        let _ = (ctx, branch_id);
        Ok(state)
    }

    /// Called once per branch that failed, after every branch has settled
    /// (`failFast=false` only — under `failFast=true` the region is
    /// already unwinding and this is not invoked).
    async fn on_branch_error(
        &self,
        ctx: &ExecutionContext,
        branch_id: &str,
        state: &S,
        err: &crate::error::FlowError,
    ) {
        let _ = (ctx, branch_id, state, err);
    }

    /// A validation/cleanup point invoked once all branches have
    /// succeeded, before [`crate::state::ParallelState::merge_branches`]
    /// runs. An error here fails the whole fork/join region.
    async fn on_join(&self, ctx: &ExecutionContext, branch_states: &BranchStates<S>) -> Result<()> {
        let _ = (ctx, branch_states);
        Ok(())
    }
}

/// A node identifier newtype-free alias re-exported for convenience at the
/// node-function boundary.
pub type Branch = NodeId;
