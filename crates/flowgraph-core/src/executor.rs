//! The sequential executor: node-by-node traversal of a compiled graph.
//!
//! This module implements the single loop both the top-level [`crate::compiled::CompiledGraph::run`]
//! and the parallel executor's branch workers drive.
//! The loop is parameterized by an optional stop node so a branch worker can
//! terminate at its join rather than at `END`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::checkpoint_manager;
use crate::compiled::CompiledGraph;
use crate::context::ExecutionContext;
use crate::error::{FlowError, Result, RouterErrorCause, RunError};
use crate::ids::{is_end, NodeId, END};
use crate::options::RunOptions;
use crate::state::ParallelState;
use crate::telemetry::LogLevel;

/// Where a single run of the sequential loop should stop.
///
/// Top-level runs stop only at `END`; branch workers additionally stop the
/// instant they reach their fork's join node, without executing it.
#[derive(Debug, Clone)]
pub(crate) enum StopAt {
    End,
    EndOrNode(NodeId),
}

impl StopAt {
    fn matches(&self, node: &str) -> bool {
        if is_end(node) {
            return true;
        }
        matches!(self, StopAt::EndOrNode(join) if join == node)
    }
}

/// Shared, run-scoped counters the sequential loop and every branch worker
/// threading through the same run must agree on: the checkpoint sequence
/// and the total iteration count.
pub(crate) struct RunCounters {
    pub sequence: AtomicU64,
    pub iterations: AtomicU64,
}

impl RunCounters {
    pub fn starting_at(sequence: u64) -> Arc<Self> {
        Arc::new(Self {
            sequence: AtomicU64::new(sequence),
            iterations: AtomicU64::new(0),
        })
    }
}

/// The outcome of driving the loop to its stop condition without error:
/// the final state and the node the loop stopped at (`END` or a join node).
pub(crate) struct DriveOutcome<S> {
    pub state: S,
    pub stopped_at: NodeId,
}

/// Drives node-by-node execution from `start` until `stop_at` is satisfied
/// or a failure occurs.
///
/// Used both for a full top-level run (`stop_at = StopAt::End`) and for a
/// single fork branch (`stop_at = StopAt::EndOrNode(join)`), which is why
/// `prev_node` and the run counters are threaded in rather than assumed to
/// start fresh.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn drive<S>(
    graph: &CompiledGraph<S>,
    ctx: &ExecutionContext,
    mut state: S,
    start: &str,
    stop_at: StopAt,
    mut prev_node: Option<NodeId>,
    options: &RunOptions,
    counters: &RunCounters,
) -> std::result::Result<DriveOutcome<S>, RunError<S>>
where
    S: ParallelState + Serialize + DeserializeOwned,
{
    let mut current: NodeId = start.to_string();

    loop {
        if stop_at.matches(&current) {
            return Ok(DriveOutcome { state, stopped_at: current });
        }

        // 3.a: increment iterations; enforce the safety net.
        let iterations = counters.iterations.fetch_add(1, Ordering::SeqCst) + 1;
        if iterations > options.max_iterations() {
            ctx.logger().log(
                LogLevel::Error,
                "max iterations exceeded",
                ctx.run_id(),
                &current,
            );
            return Err(RunError {
                error: FlowError::MaxIterations {
                    max: options.max_iterations(),
                    last_node_id: current.clone(),
                },
                state,
            });
        }

        // 3.b: non-blocking between-node cancellation check.
        if ctx.is_cancelled() {
            return Err(RunError {
                error: FlowError::Cancellation {
                    node_id: current.clone(),
                    cause: "context cancelled".to_string(),
                    was_executing: false,
                },
                state,
            });
        }

        // 3.c: fetch the node function.
        let node_fn = match graph.node_fn(&current) {
            Some(f) => f.clone(),
            None => {
                return Err(RunError {
                    error: FlowError::NodeError {
                        node_id: current.clone(),
                        op: "lookup",
                        cause: "node not found in compiled graph".to_string(),
                    },
                    state,
                })
            }
        };

        let attempt = 1u32;
        let node_ctx = ctx.for_node(current.clone(), attempt);
        let span = ctx.spans().node_span(ctx.run_id(), &current, attempt);
        let _entered = span.enter();

        ctx.logger().log(LogLevel::Debug, "node starting", ctx.run_id(), &current);
        ctx.metrics().incr_counter("flowgraph.node.executions", &[("node_id", &current)]);

        // 3.d: execute under a panic barrier.
        let node_start = Instant::now();
        let outcome = AssertUnwindSafe(node_fn(node_ctx.clone(), state.clone()))
            .catch_unwind()
            .await;
        let duration = node_start.elapsed();
        ctx.metrics().record_histogram(
            "flowgraph.node.duration",
            duration.as_secs_f64(),
            &[("node_id", &current)],
        );

        let next_state = match outcome {
            Ok(Ok(next_state)) => next_state,
            Ok(Err(node_err)) => {
                ctx.metrics().incr_counter("flowgraph.node.failures", &[("node_id", &current)]);
                let message = node_err.to_string();
                if looks_like_cancellation(&message) {
                    ctx.logger().log(LogLevel::Error, "node cancelled", ctx.run_id(), &current);
                    return Err(RunError {
                        error: FlowError::Cancellation {
                            node_id: current.clone(),
                            cause: message,
                            was_executing: true,
                        },
                        state,
                    });
                }
                ctx.logger().log(LogLevel::Error, "node failed", ctx.run_id(), &current);
                return Err(RunError {
                    error: FlowError::NodeError {
                        node_id: current.clone(),
                        op: "execute",
                        cause: message,
                    },
                    state,
                });
            }
            Err(panic) => {
                ctx.metrics().incr_counter("flowgraph.node.failures", &[("node_id", &current)]);
                let value = panic_message(&panic);
                ctx.logger().log(LogLevel::Error, "node panicked", ctx.run_id(), &current);
                return Err(RunError {
                    error: FlowError::Panic {
                        node_id: current.clone(),
                        value,
                        stack: std::backtrace::Backtrace::force_capture().to_string(),
                    },
                    state,
                });
            }
        };

        state = next_state;
        ctx.logger().log(LogLevel::Debug, "node completed", ctx.run_id(), &current);

        // 3.e / 3.f: fork delegation or routing.
        let next = if let Some(fork) = graph.get_fork_node(&current) {
            let join = fork.join_node_id.clone().ok_or_else(|| RunError {
                error: FlowError::ForkJoin {
                    fork_id: current.clone(),
                    branch_results: Vec::new(),
                    first_err: "fork has no recorded join node".to_string(),
                },
                state: state.clone(),
            })?;
            let merged = crate::parallel::run_fork(graph, ctx, &current, &fork.branches, &join, state, options, counters)
                .await
                .map_err(|e| RunError { error: e.error, state: e.state })?;
            state = merged;
            join
        } else {
            route(graph, ctx, &current, &node_ctx, &state).await.map_err(|error| RunError {
                error,
                state: state.clone(),
            })?
        };

        // 3.g: optional checkpoint write.
        if let Some(store) = options.checkpoint_store() {
            let sequence = counters.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let next_for_record = if is_end(&next) { None } else { Some(next.clone()) };
            let write = checkpoint_manager::write_checkpoint(
                store.as_ref(),
                ctx.run_id(),
                &current,
                prev_node.as_ref(),
                next_for_record.as_ref(),
                sequence,
                attempt,
                &state,
            )
            .await;
            if let Err(err) = write {
                ctx.metrics().incr_counter("flowgraph.checkpoint.saves", &[("node_id", &current)]);
                if options.checkpoint_failure_fatal() {
                    return Err(RunError { error: err, state });
                }
                ctx.logger().log(LogLevel::Warn, "checkpoint write failed, continuing", ctx.run_id(), &current);
            } else {
                ctx.metrics().incr_counter("flowgraph.checkpoint.saves", &[("node_id", &current)]);
            }
        }

        prev_node = Some(current.clone());
        current = next;
    }
}

/// 3.f: compute the successor of `current` — the router's decision if one
/// is registered (a router wins over simple edges when a node carries
/// both), else the single simple edge.
async fn route<S>(
    graph: &CompiledGraph<S>,
    ctx: &ExecutionContext,
    current: &str,
    node_ctx: &ExecutionContext,
    state: &S,
) -> Result<NodeId>
where
    S: Clone + Send + Sync + 'static,
{
    if let Some(router) = graph.router_fn(current) {
        if !graph.successors(current).is_empty() {
            ctx.logger().log(
                LogLevel::Warn,
                "node has both a router and simple edges; the router wins",
                ctx.run_id(),
                current,
            );
        }
        let outcome = AssertUnwindSafe(router(node_ctx.clone(), state.clone()))
            .catch_unwind()
            .await;
        let returned = match outcome {
            Ok(value) => value,
            Err(panic) => {
                return Err(FlowError::Panic {
                    node_id: current.to_string(),
                    value: panic_message(&panic),
                    stack: std::backtrace::Backtrace::force_capture().to_string(),
                })
            }
        };

        if returned.is_empty() {
            ctx.logger().log(LogLevel::Error, "router returned an empty result", ctx.run_id(), current);
            return Err(FlowError::RouterError {
                from_node: current.to_string(),
                returned,
                cause: RouterErrorCause::InvalidRouterResult,
            });
        }
        if is_end(&returned) {
            return Ok(END.to_string());
        }
        if !graph.has_node(&returned) {
            ctx.logger().log(LogLevel::Error, "router returned an unknown node", ctx.run_id(), current);
            return Err(FlowError::RouterError {
                from_node: current.to_string(),
                returned: returned.clone(),
                cause: RouterErrorCause::RouterTargetNotFound,
            });
        }
        return Ok(returned);
    }

    match graph.successors(current).first() {
        Some(next) => Ok(next.clone()),
        None => Err(FlowError::NodeError {
            node_id: current.to_string(),
            op: "routing",
            cause: "node has no outgoing edge".to_string(),
        }),
    }
}

/// Best-effort match for a node error that is itself reporting
/// cancellation or deadline-exceeded semantics.
fn looks_like_cancellation(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("cancel") || lower.contains("deadline exceeded") || lower.contains("timed out")
}

/// Downcasts a caught panic payload to a displayable string.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<S> CompiledGraph<S>
where
    S: ParallelState + Serialize + DeserializeOwned,
{
    /// Execute the graph to completion from its entry point.
    ///
    /// Returns the final state on success, or a [`RunError`] carrying both
    /// the underlying [`FlowError`] and the state as of the failing node.
    #[tracing::instrument(skip(self, ctx, initial_state, options), fields(entry = %self.entry_point()))]
    pub async fn run(
        &self,
        ctx: ExecutionContext,
        initial_state: S,
        options: RunOptions,
    ) -> std::result::Result<S, RunError<S>> {
        let run_id = options
            .run_id()
            .map(str::to_string)
            .unwrap_or_else(|| ctx.run_id().to_string());
        if options.checkpoint_store().is_some() && run_id.is_empty() {
            return Err(RunError { error: FlowError::RunIdRequired, state: initial_state });
        }
        let ctx = if ctx.run_id() != run_id { ctx.with_run_id(run_id) } else { ctx };

        ctx.logger().log(LogLevel::Info, "graph run starting", ctx.run_id(), self.entry_point());
        ctx.metrics().set_gauge("flowgraph.run.active", 1.0, &[]);
        let run_span = ctx.spans().run_span(ctx.run_id());
        let _entered = run_span.enter();
        let run_start = Instant::now();

        let counters = RunCounters::starting_at(0);
        let result = drive(
            self,
            &ctx,
            initial_state,
            self.entry_point(),
            StopAt::End,
            None,
            &options,
            &counters,
        )
        .await;

        ctx.metrics().record_histogram(
            "flowgraph.run.duration",
            run_start.elapsed().as_secs_f64(),
            &[],
        );
        ctx.metrics().set_gauge("flowgraph.run.active", 0.0, &[]);

        match result {
            Ok(outcome) => {
                ctx.logger().log(LogLevel::Info, "graph run completed", ctx.run_id(), &outcome.stopped_at);
                Ok(outcome.state)
            }
            Err(err) => {
                ctx.logger().log(LogLevel::Error, "graph run failed", ctx.run_id(), "");
                Err(err)
            }
        }
    }
}
