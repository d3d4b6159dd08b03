//! Error taxonomy for graph construction, validation, and execution.
//!
//! Every failure mode a caller can hit is a variant of [`FlowError`]. Each
//! variant documents its common causes and the state it carries for
//! post-mortem inspection, keeping structured fields (`node_id`, `cause`,
//! ...) rather than an opaque `String` payload, since flowgraph is meant
//! to be introspected programmatically by callers composing retry or
//! escalation policies on top.
//!
//! # Error Hierarchy
//!
//! ```text
//! FlowError
//! ├── Validation errors (surfaced from `compile`)
//! │   ├── NoEntryPoint
//! │   ├── EntryNotFound
//! │   ├── NodeNotFound
//! │   ├── NoPathToEnd
//! │   └── OverlappingForks
//! ├── Node { NodeError, PanicError, RouterError }
//! ├── Cancellation
//! ├── MaxIterations
//! ├── Checkpoint { CheckpointError }
//! ├── ForkJoin
//! └── Resume { RunIdRequired, NoCheckpoints, SerializeState,
//!              DeserializeState, InvalidResumeNode,
//!              CheckpointVersionMismatch }
//! ```

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowError>;

/// One entry in a [`FlowError::Validation`] aggregate: a single structural
/// violation found while validating a builder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// No entry point was set on the builder.
    #[error("no entry point set")]
    NoEntryPoint,
    /// The configured entry point does not name an existing node.
    #[error("entry point {0:?} does not name an existing node")]
    EntryNotFound(String),
    /// A simple or conditional edge names a node that does not exist.
    #[error("edge from {from:?} references unknown node {target:?}")]
    NodeNotFound {
        /// Edge source.
        from: String,
        /// The missing target.
        target: String,
    },
    /// No path from the entry point to `END` exists even under the
    /// optimistic assumption that any conditional router may return
    /// `END`.
    #[error("no path from entry point to END")]
    NoPathToEnd,
    /// Two or more fork nodes have overlapping, non-nested branch sets,
    /// which the simplified post-dominator analysis cannot resolve to a
    /// unique join for each.
    #[error("overlapping, non-nested forks detected at nodes {0:?}")]
    OverlappingForks(Vec<String>),

    /// A fork node's branches share no common node every branch can reach,
    /// so no join could be computed. Recorded as a validation issue
    /// rather than left silently unresolved, since the executor has no
    /// node to resume from after the fork completes.
    #[error("fork node {0:?} has no common join reachable from every branch")]
    NoJoinForFork(String),
}

/// The single error type returned by every fallible flowgraph operation.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Graph compilation found one or more structural problems.
    ///
    /// Carries every [`ValidationIssue`] found in one validation pass,
    /// not just the first.
    #[error("graph validation failed: {0:?}")]
    Validation(Vec<ValidationIssue>),

    /// A node function returned an error, or an internal lookup/routing
    /// step failed in a way that should be structurally impossible after
    /// successful compilation but is guarded defensively anyway.
    #[error("node {node_id:?} failed during {op}: {cause}")]
    NodeError {
        /// Node that failed.
        node_id: String,
        /// Which phase of node handling failed: `"lookup"`, `"execute"`,
        /// or `"routing"`.
        op: &'static str,
        /// Underlying cause.
        cause: String,
    },

    /// A node or router body panicked; the panic was caught at the
    /// per-node boundary and converted into this error.
    #[error("node {node_id:?} panicked: {value}")]
    Panic {
        /// Node whose body panicked.
        node_id: String,
        /// The panic payload, downcast to a displayable string where
        /// possible.
        value: String,
        /// Best-effort captured backtrace, for diagnostic logs only.
        stack: String,
    },

    /// Execution was cancelled, either between two nodes or during a node
    /// that itself observed and surfaced the cancellation.
    #[error(
        "run cancelled at node {node_id:?} (was_executing={was_executing}): {cause}"
    )]
    Cancellation {
        /// Node the run was at (about to run, or running) when cancelled.
        node_id: String,
        /// Underlying cancellation cause.
        cause: String,
        /// `true` if the node itself was mid-execution and surfaced the
        /// cancellation as its own error; `false` if caught by the
        /// between-node check.
        was_executing: bool,
    },

    /// A router function returned an invalid result.
    #[error("router at {from_node:?} returned {returned:?}: {cause}")]
    RouterError {
        /// Node whose router misbehaved.
        from_node: String,
        /// The raw value the router returned.
        returned: String,
        /// Which way it was invalid.
        cause: RouterErrorCause,
    },

    /// The safety-net iteration cap was reached.
    #[error("exceeded max iterations ({max}); last node was {last_node_id:?}")]
    MaxIterations {
        /// Configured cap.
        max: u64,
        /// Node the executor was on when the cap tripped.
        last_node_id: String,
    },

    /// A checkpoint operation failed.
    #[error("checkpoint error for node {node_id:?} during {op}: {cause}")]
    CheckpointError {
        /// Node the checkpoint was being written for.
        node_id: String,
        /// Which phase failed: `"serialize"`, `"marshal"`, or `"save"`.
        op: &'static str,
        /// Underlying cause.
        cause: String,
    },

    /// One or more branches of a fork/join region failed.
    #[error("fork/join at {fork_id:?} failed: {first_err}")]
    ForkJoin {
        /// The fork node whose region failed.
        fork_id: String,
        /// Per-branch outcome, for post-mortem inspection. The
        /// branch's own state is not carried here — [`FlowError`] stays
        /// non-generic; the branch states that matter for post-mortem
        /// are the ones the run's own [`RunError::state`] and the branch
        /// hook's `on_branch_error` already saw (see `DESIGN.md`).
        branch_results: Vec<BranchOutcome>,
        /// First error encountered among the branches (by completion
        /// order under fail-fast, or by branch id otherwise).
        first_err: String,
    },

    /// Checkpointing was requested without a run id.
    #[error("a run id is required when checkpointing is enabled")]
    RunIdRequired,

    /// `resume` found no checkpoints for the requested run.
    #[error("no checkpoints exist for run {0:?}")]
    NoCheckpoints(String),

    /// State could not be serialized for checkpointing or cloning.
    #[error("failed to serialize state: {0}")]
    SerializeState(String),

    /// A loaded checkpoint's state could not be deserialized.
    #[error("failed to deserialize checkpoint state: {0}")]
    DeserializeState(String),

    /// The resume start node (the checkpoint's `next_node_id`, or its
    /// `node_id` under `replay_node`) is neither `END` nor an existing
    /// node.
    #[error("resume start node {0:?} is not END and not a known node")]
    InvalidResumeNode(String),

    /// A loaded checkpoint's schema version does not match the version
    /// this build of flowgraph understands.
    #[error("checkpoint schema version {found} does not match expected {expected}")]
    CheckpointVersionMismatch {
        /// Version found on the loaded record.
        found: u32,
        /// Version this build expects.
        expected: u32,
    },

    /// Wraps errors returned by the checkpoint store implementation
    /// itself, as opposed to errors in how the engine used it.
    #[error("checkpoint store error: {0}")]
    Store(#[from] flowgraph_checkpoint::CheckpointError),
}

/// One branch's outcome within a completed or aborted fork/join region.
///
/// Carries only metadata, not the branch's own state value — see
/// [`FlowError::ForkJoin`]'s doc comment for why.
#[derive(Debug, Clone)]
pub struct BranchOutcome {
    /// The branch's entry node id.
    pub branch_id: String,
    /// `true` if the branch ran to its join/`END` without error.
    pub succeeded: bool,
    /// The branch's error, if it failed.
    pub error: Option<String>,
    /// Wall-clock time the branch took.
    pub duration: std::time::Duration,
}

/// The result of a failed [`crate::compiled::CompiledGraph::run`] or
/// [`crate::resume::resume`]: the underlying error alongside the state as
/// of the failing node.
///
/// Kept as a wrapper around `(FlowError, S)` rather than threading `S`
/// into every [`FlowError`] variant, so `FlowError` itself stays a plain,
/// non-generic enum callers can match on without naming their state type
/// (`DESIGN.md` records this resolution).
#[derive(Debug)]
pub struct RunError<S> {
    /// The failure that ended the run.
    pub error: FlowError,
    /// State as of the node that failed (its input state for a node or
    /// router failure; the fork-entry state for a failed fork/join
    /// region; the last checkpointed state for cancellation or
    /// max-iterations).
    pub state: S,
}

impl<S: std::fmt::Debug> std::fmt::Display for RunError<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl<S: std::fmt::Debug> std::error::Error for RunError<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// The two ways a router function's result can be invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterErrorCause {
    /// The router returned an empty string.
    InvalidRouterResult,
    /// The router returned a non-empty, non-`END` id that names no node
    /// in the compiled graph.
    RouterTargetNotFound,
}

impl std::fmt::Display for RouterErrorCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterErrorCause::InvalidRouterResult => write!(f, "invalid router result"),
            RouterErrorCause::RouterTargetNotFound => write!(f, "router target not found"),
        }
    }
}
