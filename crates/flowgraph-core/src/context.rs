//! Execution context threaded through every node and router call.
//!
//! Wraps a base cancellation-bearing context and exposes: logger, an
//! optional extension slot (e.g. an LLM client), an optional checkpoint
//! store, the run id, the current node id, and the attempt counter.
//! `tokio_util::sync::CancellationToken` is the cancellation primitive:
//! cheap to clone, supports child tokens for per-node/per-branch
//! derivation, non-blocking `is_cancelled()` for the between-node check,
//! and an awaitable `cancelled()` for the branch-join suspension point.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ids::NodeId;
use crate::telemetry::Telemetry;

/// Type-erased slot for services a node wants available without this
/// crate knowing their concrete type (an LLM client, tenant metadata),
/// carried as values keyed by type rather than as process-wide
/// singletons.
#[derive(Clone, Default)]
pub struct Extensions {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, keyed by its concrete type. A second insert of the
    /// same type replaces the first.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Fetch a previously inserted value of type `T`, if any.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
    }
}

/// Per-run, per-node execution context.
///
/// Immutable once constructed; the executor derives a child per node via
/// [`ExecutionContext::for_node`], which enriches `node_id`/`attempt` and
/// shares the same cancellation token, logger, metrics, and extensions.
#[derive(Clone)]
pub struct ExecutionContext {
    cancellation: CancellationToken,
    run_id: String,
    node_id: NodeId,
    attempt: u32,
    telemetry: Telemetry,
    extensions: Extensions,
}

impl ExecutionContext {
    /// Construct the base context a run starts from.
    pub fn new(run_id: impl Into<String>, cancellation: CancellationToken, telemetry: Telemetry) -> Self {
        Self {
            cancellation,
            run_id: run_id.into(),
            node_id: String::new(),
            attempt: 1,
            telemetry,
            extensions: Extensions::new(),
        }
    }

    /// Attach an extension value (e.g. an LLM client) to this context.
    pub fn with_extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// Override the run id this context reports. Used by [`crate::executor`]
    /// to reconcile a caller-supplied [`crate::options::RunOptions::with_run_id`]
    /// with a context constructed without one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Derive a per-node context: same cancellation token, logger,
    /// metrics, and extensions, with `node_id`/`attempt` updated.
    pub fn for_node(&self, node_id: impl Into<NodeId>, attempt: u32) -> Self {
        Self {
            cancellation: self.cancellation.clone(),
            run_id: self.run_id.clone(),
            node_id: node_id.into(),
            attempt,
            telemetry: self.telemetry.clone(),
            extensions: self.extensions.clone(),
        }
    }

    /// Derive a child context whose cancellation token is linked to this
    /// one but can additionally be cancelled independently (used by the
    /// parallel executor to cancel all branches without affecting the
    /// caller's own token).
    pub fn child_cancellable(&self) -> (Self, CancellationToken) {
        let token = self.cancellation.child_token();
        let ctx = Self {
            cancellation: token.clone(),
            ..self.clone()
        };
        (ctx, token)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Non-blocking cancellation check.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Awaits cancellation; used at suspension points where the executor
    /// can usefully yield rather than poll.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn logger(&self) -> &Arc<dyn crate::telemetry::Logger> {
        &self.telemetry.logger
    }

    pub fn metrics(&self) -> &Arc<dyn crate::telemetry::MetricsRecorder> {
        &self.telemetry.metrics
    }

    pub fn spans(&self) -> &Arc<dyn crate::telemetry::SpanSource> {
        &self.telemetry.spans
    }

    /// Fetch a previously attached extension value.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extensions.get::<T>()
    }
}
