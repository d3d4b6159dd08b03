//! Run, resume, and context configuration values, as plain builder
//! structs with `with_*` fluent setters.

use std::sync::Arc;

use flowgraph_checkpoint::CheckpointStore;
use tokio_util::sync::CancellationToken;

use crate::ids::NodeId;
use crate::telemetry::Telemetry;

/// Default cap on total node executions per run.
pub const DEFAULT_MAX_ITERATIONS: u64 = 1000;

/// Default fork/join concurrency cap; `0` means unlimited.
pub const UNLIMITED_CONCURRENCY: usize = 0;

/// Fork/join execution policy.
#[derive(Clone)]
pub struct ForkJoinConfig {
    /// Maximum number of branches run concurrently; `0` = unlimited.
    pub max_concurrency: usize,
    /// `true`: cancel remaining branches on first failure and return as
    /// soon as they unwind. `false` (default): wait for every branch.
    pub fail_fast: bool,
    /// Overall deadline for a fork/join region; `None` = no deadline.
    pub merge_timeout: Option<std::time::Duration>,
}

impl Default for ForkJoinConfig {
    fn default() -> Self {
        Self {
            max_concurrency: UNLIMITED_CONCURRENCY,
            fail_fast: false,
            merge_timeout: None,
        }
    }
}

impl ForkJoinConfig {
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_merge_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.merge_timeout = Some(timeout);
        self
    }
}

/// Configuration for a single [`crate::compiled::CompiledGraph::run`]
/// invocation.
///
/// Covers `max_iterations`, `checkpointing`, `run_id`, and
/// `checkpoint_failure_fatal`. Logger/metrics/tracing and cancellation
/// live on [`crate::context::ExecutionContext`] / [`crate::options::ContextOptions`]
/// instead, since they're properties of the run's identity and
/// environment rather than of a single invocation.
#[derive(Clone)]
pub struct RunOptions {
    pub(crate) max_iterations: u64,
    pub(crate) run_id: Option<String>,
    pub(crate) checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    pub(crate) checkpoint_failure_fatal: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            run_id: None,
            checkpoint_store: None,
            checkpoint_failure_fatal: false,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap total node executions; only positive values are respected.
    pub fn with_max_iterations(mut self, n: u64) -> Self {
        if n > 0 {
            self.max_iterations = n;
        }
        self
    }

    /// Enable checkpoint writes against `store`. Requires `run_id`;
    /// enforced at the start of `run`, not here.
    pub fn with_checkpointing(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Caller-supplied run identifier.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Whether a checkpoint write failure aborts the run (`true`) or is
    /// logged and ignored (`false`, default).
    pub fn with_checkpoint_failure_fatal(mut self, fatal: bool) -> Self {
        self.checkpoint_failure_fatal = fatal;
        self
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn max_iterations(&self) -> u64 {
        self.max_iterations
    }

    pub fn checkpoint_store(&self) -> Option<&Arc<dyn CheckpointStore>> {
        self.checkpoint_store.as_ref()
    }

    pub fn checkpoint_failure_fatal(&self) -> bool {
        self.checkpoint_failure_fatal
    }
}

/// Configuration for [`crate::resume::resume`] / [`crate::resume::resume_from`].
pub struct ResumeOptions<S> {
    pub(crate) state_override: Option<Box<dyn FnOnce(S) -> S + Send>>,
    pub(crate) state_validation: Option<Box<dyn Fn(&S) -> crate::error::Result<()> + Send + Sync>>,
    pub(crate) replay_node: bool,
    pub(crate) run_options: RunOptions,
}

impl<S> Default for ResumeOptions<S> {
    fn default() -> Self {
        Self {
            state_override: None,
            state_validation: None,
            replay_node: false,
            run_options: RunOptions::default(),
        }
    }
}

impl<S> ResumeOptions<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform the loaded state before resuming execution.
    pub fn with_state_override(mut self, f: impl FnOnce(S) -> S + Send + 'static) -> Self {
        self.state_override = Some(Box::new(f));
        self
    }

    /// Validate the loaded (and possibly overridden) state before
    /// resuming; an `Err` aborts the resume.
    pub fn with_state_validation(
        mut self,
        f: impl Fn(&S) -> crate::error::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.state_validation = Some(Box::new(f));
        self
    }

    /// Restart from the checkpointed node itself (re-executing it) rather
    /// than its already-computed `next_node_id`.
    pub fn with_replay_node(mut self, replay: bool) -> Self {
        self.replay_node = replay;
        self
    }

    /// Options forwarded to the underlying `run` call (max iterations,
    /// telemetry, checkpoint-failure policy, cancellation).
    pub fn with_run_options(mut self, run_options: RunOptions) -> Self {
        self.run_options = run_options;
        self
    }
}

/// Values used to construct an initial [`crate::context::ExecutionContext`]
/// outside of a `run`/`resume` call — for tests, or for callers driving
/// node functions directly.
#[derive(Default)]
pub struct ContextOptions {
    pub(crate) run_id: Option<NodeId>,
    pub(crate) telemetry: Option<Telemetry>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn build(self) -> crate::context::ExecutionContext {
        crate::context::ExecutionContext::new(
            self.run_id.unwrap_or_default(),
            self.cancellation.unwrap_or_default(),
            self.telemetry.unwrap_or_default(),
        )
    }
}
