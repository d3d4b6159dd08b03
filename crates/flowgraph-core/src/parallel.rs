//! The parallel fork/join executor.
//!
//! A fork node dispatches one [`crate::executor::drive`] call per branch,
//! each starting at the branch's entry node and stopping at the fork's
//! join node rather than `END`. Branches run as
//! concurrently-polled futures bounded by a [`tokio::sync::Semaphore`]
//! rather than as `tokio::spawn`ed tasks — nothing here needs a branch to
//! survive past `run_fork` returning, and borrowing the compiled graph and
//! run counters directly (instead of wrapping them in `Arc`) keeps the
//! common, non-parallel path free of that cost.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::compiled::CompiledGraph;
use crate::context::ExecutionContext;
use crate::error::{BranchOutcome, FlowError, RunError};
use crate::executor::{self, RunCounters, StopAt};
use crate::ids::NodeId;
use crate::options::RunOptions;
use crate::state::{BranchStates, ParallelState};
use crate::telemetry::LogLevel;

enum BranchResult<S> {
    Success {
        branch_id: NodeId,
        state: S,
        duration: Duration,
    },
    Failure {
        branch_id: NodeId,
        error: RunError<S>,
        duration: Duration,
        /// `true` for a failure in the `on_fork` hook itself, which
        /// aborts the whole region regardless of `fail_fast`.
        aborts_fork: bool,
    },
}

/// Runs every branch of the fork at `fork_id` to the join node `join_id`,
/// merges their final states, and returns the state the join node should
/// observe.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_fork<S>(
    graph: &CompiledGraph<S>,
    ctx: &ExecutionContext,
    fork_id: &str,
    branches: &[NodeId],
    join_id: &NodeId,
    state: S,
    options: &RunOptions,
    counters: &RunCounters,
) -> std::result::Result<S, RunError<S>>
where
    S: ParallelState + Serialize + DeserializeOwned,
{
    let config = graph.fork_join_config.clone();
    let permits = if config.max_concurrency == 0 {
        branches.len().max(1)
    } else {
        config.max_concurrency
    };
    let semaphore = Arc::new(Semaphore::new(permits));
    let (branch_ctx, fork_token) = ctx.child_cancellable();

    ctx.logger().log(LogLevel::Debug, "fork starting", ctx.run_id(), fork_id);
    ctx.metrics().incr_counter("flowgraph.fork.starts", &[("fork_id", fork_id)]);

    let hook = graph.branch_hook.clone();
    let mut tasks = FuturesUnordered::new();

    for branch_id in branches {
        let branch_id = branch_id.clone();
        let semaphore = semaphore.clone();
        let branch_ctx = branch_ctx.clone();
        let original = state.clone();
        let hook = hook.clone();
        let join_id = join_id.clone();

        tasks.push(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("fork semaphore is never closed");
            let branch_start = Instant::now();

            let cloned = original.fork_clone(&branch_id);
            let branch_state = if let Some(hook) = hook.as_ref() {
                match hook.on_fork(&branch_ctx, &branch_id, cloned).await {
                    Ok(s) => s,
                    Err(err) => {
                        return BranchResult::Failure {
                            branch_id,
                            error: RunError { error: err, state: original },
                            duration: branch_start.elapsed(),
                            aborts_fork: true,
                        };
                    }
                }
            } else {
                cloned
            };

            let outcome = executor::drive(
                graph,
                &branch_ctx,
                branch_state,
                &branch_id,
                StopAt::EndOrNode(join_id),
                None,
                options,
                counters,
            )
            .await;

            match outcome {
                Ok(drive_outcome) => BranchResult::Success {
                    branch_id,
                    state: drive_outcome.state,
                    duration: branch_start.elapsed(),
                },
                Err(error) => BranchResult::Failure {
                    branch_id,
                    error,
                    duration: branch_start.elapsed(),
                    aborts_fork: false,
                },
            }
        });
    }

    let mut results: Vec<BranchResult<S>> = Vec::with_capacity(branches.len());
    let mut aborted = false;
    let mut first_abort_err: Option<String> = None;
    let collect = async {
        while let Some(result) = tasks.next().await {
            let forces_abort = matches!(&result, BranchResult::Failure { aborts_fork: true, .. })
                || (config.fail_fast && matches!(&result, BranchResult::Failure { .. }));
            if forces_abort && !aborted {
                aborted = true;
                fork_token.cancel();
                if let BranchResult::Failure { error, .. } = &result {
                    first_abort_err = Some(error.error.to_string());
                }
            }
            // Every branch's outcome is recorded, aborted or not: cancelling
            // `fork_token` only asks the remaining branches to unwind at
            // their next between-node check, it doesn't stop polling them
            // here — the loop keeps draining `tasks` until every branch,
            // including ones already in flight when the abort happened, has
            // settled.
            results.push(result);
        }
    };

    if let Some(deadline) = config.merge_timeout {
        if tokio::time::timeout(deadline, collect).await.is_err() {
            fork_token.cancel();
            ctx.logger().log(LogLevel::Error, "fork/join merge timeout elapsed", ctx.run_id(), fork_id);
            return Err(RunError {
                error: FlowError::ForkJoin {
                    fork_id: fork_id.to_string(),
                    branch_results: Vec::new(),
                    first_err: "merge timeout elapsed before all branches completed".to_string(),
                },
                state,
            });
        }
    } else {
        collect.await;
    }

    let mut outcomes: Vec<BranchOutcome> = Vec::with_capacity(results.len());
    let mut successes: HashMap<NodeId, S> = HashMap::new();
    let mut failures: Vec<(NodeId, RunError<S>)> = Vec::new();

    for result in results {
        match result {
            BranchResult::Success { branch_id, state: branch_state, duration } => {
                outcomes.push(BranchOutcome {
                    branch_id: branch_id.clone(),
                    succeeded: true,
                    error: None,
                    duration,
                });
                successes.insert(branch_id, branch_state);
            }
            BranchResult::Failure { branch_id, error, duration, .. } => {
                outcomes.push(BranchOutcome {
                    branch_id: branch_id.clone(),
                    succeeded: false,
                    error: Some(error.error.to_string()),
                    duration,
                });
                failures.push((branch_id, error));
            }
        }
    }

    if !failures.is_empty() {
        failures.sort_by(|a, b| a.0.cmp(&b.0));

        // `on_branch_error` is a `failFast=false` notification only: under
        // `failFast=true` the region is already cancelled and unwinding by
        // the time any branch is inspected here, so the hook is never
        // invoked for it.
        if !config.fail_fast {
            if let Some(hook) = hook.as_ref() {
                for (branch_id, err) in &failures {
                    hook.on_branch_error(ctx, branch_id, &err.state, &err.error).await;
                }
            }
        }

        // Completion order under fail-fast / an `on_fork`-hook abort (the
        // error that actually triggered cancellation); branch-id order
        // otherwise, matching `FlowError::ForkJoin::first_err`'s doc comment.
        let first_err = first_abort_err.unwrap_or_else(|| failures[0].1.error.to_string());
        ctx.metrics().incr_counter("flowgraph.fork.failures", &[("fork_id", fork_id)]);
        ctx.logger().log(LogLevel::Error, "fork/join region failed", ctx.run_id(), fork_id);

        return Err(RunError {
            error: FlowError::ForkJoin {
                fork_id: fork_id.to_string(),
                branch_results: outcomes,
                first_err,
            },
            state,
        });
    }

    let branch_states = BranchStates::new(successes);

    if let Some(hook) = hook.as_ref() {
        if let Err(err) = hook.on_join(ctx, &branch_states).await {
            ctx.logger().log(LogLevel::Error, "on_join hook failed", ctx.run_id(), fork_id);
            return Err(RunError {
                error: FlowError::ForkJoin {
                    fork_id: fork_id.to_string(),
                    branch_results: outcomes,
                    first_err: err.to_string(),
                },
                state,
            });
        }
    }

    let merged = S::merge_branches(&state, &branch_states);
    ctx.metrics().incr_counter("flowgraph.fork.completions", &[("fork_id", fork_id)]);
    ctx.logger().log(LogLevel::Debug, "fork completed", ctx.run_id(), fork_id);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::executor::RunCounters;
    use crate::graph::GraphBuilder;
    use crate::ids::END;
    use crate::node::BranchHook;
    use crate::options::{ForkJoinConfig, RunOptions};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
    struct DummyState {
        value: i64,
    }

    impl ParallelState for DummyState {}

    #[derive(Default)]
    struct RecordingHook {
        branch_errors: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BranchHook<DummyState> for RecordingHook {
        async fn on_branch_error(
            &self,
            _ctx: &ExecutionContext,
            branch_id: &str,
            _state: &DummyState,
            _err: &FlowError,
        ) {
            self.branch_errors.lock().unwrap().push(branch_id.to_string());
        }
    }

    /// `dispatch -> {slow, bad} -> collect -> END`: `bad` fails immediately,
    /// `slow` sleeps long enough that a fail-fast abort is guaranteed to be
    /// signalled before it reaches the join.
    fn build_fork_graph(fail_fast: bool, hook: Arc<RecordingHook>) -> crate::compiled::CompiledGraph<DummyState> {
        let mut builder = GraphBuilder::<DummyState>::new();
        builder.add_node("dispatch", |_ctx, s: DummyState| async move { Ok(s) });
        builder.add_node("slow", |_ctx, s: DummyState| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(s)
        });
        builder.add_node("bad", |_ctx, _s: DummyState| async move {
            Err::<DummyState, _>("branch failed".into())
        });
        builder.add_node("collect", |_ctx, s: DummyState| async move { Ok(s) });
        builder.add_edge("dispatch", "slow");
        builder.add_edge("dispatch", "bad");
        builder.add_edge("slow", "collect");
        builder.add_edge("bad", "collect");
        builder.add_edge("collect", END);
        builder.set_entry("dispatch");
        builder.set_branch_hook(hook);
        builder.set_fork_join_config(ForkJoinConfig::default().with_fail_fast(fail_fast));
        builder.compile().expect("fork graph is well-formed")
    }

    async fn run_dispatch_fork(
        graph: &crate::compiled::CompiledGraph<DummyState>,
    ) -> RunError<DummyState> {
        let fork = graph.get_fork_node("dispatch").expect("dispatch is a fork node");
        let ctx = ExecutionContext::default();
        let options = RunOptions::new();
        let counters = RunCounters::starting_at(0);

        run_fork(
            graph,
            &ctx,
            "dispatch",
            &fork.branches,
            fork.join_node_id.as_ref().expect("dispatch has a join"),
            DummyState::default(),
            &options,
            &counters,
        )
        .await
        .expect_err("bad branch always fails")
    }

    #[tokio::test]
    async fn fail_fast_abort_still_collects_an_outcome_for_every_branch() {
        let hook = Arc::new(RecordingHook::default());
        let graph = build_fork_graph(true, hook.clone());

        let err = run_dispatch_fork(&graph).await;

        match err.error {
            FlowError::ForkJoin { branch_results, .. } => {
                assert_eq!(
                    branch_results.len(),
                    2,
                    "expected an outcome for every branch, not just the one that aborted: {branch_results:?}"
                );
                let ids: HashSet<_> = branch_results.iter().map(|o| o.branch_id.clone()).collect();
                assert!(ids.contains("slow"));
                assert!(ids.contains("bad"));
            }
            other => panic!("expected a ForkJoin error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fail_fast_abort_never_invokes_on_branch_error() {
        let hook = Arc::new(RecordingHook::default());
        let graph = build_fork_graph(true, hook.clone());

        let _ = run_dispatch_fork(&graph).await;

        assert!(
            hook.branch_errors.lock().unwrap().is_empty(),
            "on_branch_error must not fire while failFast=true is unwinding"
        );
    }

    #[tokio::test]
    async fn wait_all_invokes_on_branch_error_for_the_failed_branch() {
        let hook = Arc::new(RecordingHook::default());
        let graph = build_fork_graph(false, hook.clone());

        let err = run_dispatch_fork(&graph).await;

        match err.error {
            FlowError::ForkJoin { branch_results, .. } => assert_eq!(branch_results.len(), 2),
            other => panic!("expected a ForkJoin error, got {other:?}"),
        }
        assert_eq!(hook.branch_errors.lock().unwrap().as_slice(), ["bad".to_string()]);
    }
}
