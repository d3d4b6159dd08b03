//! flowgraph-core: a graph execution engine for workflows whose nodes are
//! state transformations and whose edges are control flow.
//!
//! A workflow is built with [`GraphBuilder`], compiled into an immutable,
//! freely-shareable [`CompiledGraph`], then driven with
//! [`CompiledGraph::run`] or, after a crash, resumed with
//! [`CompiledGraph::resume`] / [`CompiledGraph::resume_from`] against a
//! [`flowgraph_checkpoint::CheckpointStore`].
//!
//! ```
//! use flowgraph_core::{GraphBuilder, ExecutionContext, RunOptions};
//!
//! #[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
//! struct Counter { value: i64 }
//! impl flowgraph_core::state::ParallelState for Counter {}
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = GraphBuilder::<Counter>::new();
//! builder
//!     .add_node("increment", |_ctx, mut state: Counter| async move {
//!         state.value += 1;
//!         Ok(state)
//!     })
//!     .add_edge("increment", flowgraph_core::END)
//!     .set_entry("increment");
//!
//! let graph = builder.compile()?;
//! let result = graph
//!     .run(ExecutionContext::default(), Counter { value: 0 }, RunOptions::new())
//!     .await
//!     .map_err(|e| e.error)?;
//! assert_eq!(result.value, 1);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint_manager;
pub mod compiled;
pub mod context;
pub mod error;
pub mod executor;
pub mod forkjoin;
pub mod graph;
pub mod ids;
pub mod node;
pub mod options;
pub mod parallel;
pub mod resume;
pub mod state;
pub mod telemetry;

mod validate;

pub use compiled::CompiledGraph;
pub use context::ExecutionContext;
pub use error::{BranchOutcome, FlowError, Result, RunError, RouterErrorCause, ValidationIssue};
pub use graph::GraphBuilder;
pub use ids::{is_end, NodeId, END};
pub use node::{BoxFuture, Branch, BranchHook, NodeError, NodeOutcome};
pub use options::{ContextOptions, ForkJoinConfig, ResumeOptions, RunOptions};
pub use state::{BranchStates, ParallelState};
pub use telemetry::{LogLevel, Logger, MetricsRecorder, SpanSource, Telemetry};

impl Default for ExecutionContext {
    /// A context with a generated run id, no cancellation, and `tracing`-backed
    /// telemetry — the common case for ad hoc `run` calls and tests.
    fn default() -> Self {
        ContextOptions::new()
            .with_run_id(uuid::Uuid::new_v4().to_string())
            .build()
    }
}
