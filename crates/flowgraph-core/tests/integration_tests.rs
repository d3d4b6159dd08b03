use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowgraph_checkpoint::InMemoryCheckpointStore;
use flowgraph_core::state::{clone_via_json, BranchStates, ParallelState};
use flowgraph_core::{
    BranchHook, CompiledGraph, ExecutionContext, FlowError, GraphBuilder, ResumeOptions,
    RunOptions, ValidationIssue, END,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    value: i64,
    path: Vec<String>,
}

impl ParallelState for Counter {}

fn record(node: &str, mut state: Counter) -> Counter {
    state.path.push(node.to_string());
    state
}

#[tokio::test]
async fn linear_three_node_increment() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("a", |_ctx, s: Counter| async move {
        Ok(record("a", Counter { value: s.value + 1, ..s }))
    });
    builder.add_node("b", |_ctx, s: Counter| async move {
        Ok(record("b", Counter { value: s.value + 1, ..s }))
    });
    builder.add_node("c", |_ctx, s: Counter| async move {
        Ok(record("c", Counter { value: s.value + 1, ..s }))
    });
    builder.add_edge("a", "b");
    builder.add_edge("b", "c");
    builder.add_edge("c", END);
    builder.set_entry("a");

    let graph = builder.compile().unwrap();
    let result = graph
        .run(ExecutionContext::default(), Counter::default(), RunOptions::new())
        .await
        .unwrap();

    assert_eq!(result.value, 3);
    assert_eq!(result.path, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn conditional_branch_routes_on_state() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("start", |_ctx, s: Counter| async move { Ok(record("start", s)) });
    builder.add_node("left", |_ctx, s: Counter| async move {
        Ok(record("left", Counter { value: s.value + 10, ..s }))
    });
    builder.add_node("right", |_ctx, s: Counter| async move {
        Ok(record("right", Counter { value: s.value - 10, ..s }))
    });
    builder.add_conditional_edge("start", |_ctx, s: Counter| async move {
        if s.value >= 0 { "left".to_string() } else { "right".to_string() }
    });
    builder.add_edge("left", END);
    builder.add_edge("right", END);
    builder.set_entry("start");

    let graph = builder.compile().unwrap();

    let go_left = graph
        .run(ExecutionContext::default(), Counter { value: 1, ..Default::default() }, RunOptions::new())
        .await
        .unwrap();
    assert_eq!(go_left.path, vec!["start", "left"]);
    assert_eq!(go_left.value, 11);

    let go_right = graph
        .run(ExecutionContext::default(), Counter { value: -1, ..Default::default() }, RunOptions::new())
        .await
        .unwrap();
    assert_eq!(go_right.path, vec!["start", "right"]);
    assert_eq!(go_right.value, -11);
}

#[tokio::test]
async fn retry_loop_via_self_edge_then_conditional_exit() {
    let attempts = Arc::new(AtomicU64::new(0));
    let attempts_for_node = attempts.clone();

    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("try", move |_ctx, s: Counter| {
        let attempts = attempts_for_node.clone();
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(record("try", Counter { value: s.value + 1, ..s }))
        }
    });
    builder.add_conditional_edge("try", |_ctx, s: Counter| async move {
        if s.value < 3 { "try".to_string() } else { END.to_string() }
    });
    builder.set_entry("try");

    let graph = builder.compile().unwrap();
    let result = graph
        .run(ExecutionContext::default(), Counter::default(), RunOptions::new())
        .await
        .unwrap();

    assert_eq!(result.value, 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(result.path, vec!["try", "try", "try"]);
}

#[tokio::test]
async fn crash_and_resume_continues_from_last_checkpoint() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("a", |_ctx, s: Counter| async move { Ok(record("a", s)) });
    builder.add_node("b", |ctx, s: Counter| async move {
        if ctx.attempt() == 1 && s.path == vec!["a".to_string()] {
            return Err("simulated crash in node b".into());
        }
        Ok(record("b", s))
    });
    builder.add_node("c", |_ctx, s: Counter| async move { Ok(record("c", s)) });
    builder.add_edge("a", "b");
    builder.add_edge("b", "c");
    builder.add_edge("c", END);
    builder.set_entry("a");

    let graph = builder.compile().unwrap();
    let store = Arc::new(InMemoryCheckpointStore::new());
    let run_id = "run-crash-resume".to_string();
    let options = RunOptions::new()
        .with_run_id(run_id.clone())
        .with_checkpointing(store.clone() as Arc<dyn flowgraph_checkpoint::CheckpointStore>);

    let first_attempt = graph
        .run(ExecutionContext::default(), Counter::default(), options)
        .await;
    assert!(first_attempt.is_err());

    let resumed = graph
        .resume(
            ExecutionContext::default(),
            run_id,
            store as Arc<dyn flowgraph_checkpoint::CheckpointStore>,
            ResumeOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(resumed.path, vec!["a", "b", "c"]);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SumState {
    total: i64,
}

impl ParallelState for SumState {
    fn merge_branches(original: &Self, branches: &BranchStates<Self>) -> Self {
        let mut total = original.total;
        for (_, branch_state) in branches.iter() {
            total += branch_state.total;
        }
        SumState { total }
    }
}

struct NoopHook;

#[async_trait]
impl BranchHook<SumState> for NoopHook {
    async fn on_join(
        &self,
        _ctx: &ExecutionContext,
        _branch_states: &BranchStates<SumState>,
    ) -> flowgraph_core::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn fork_join_merges_branch_results() {
    let mut builder = GraphBuilder::<SumState>::new();
    builder.add_node("dispatch", |_ctx, s: SumState| async move { Ok(s) });
    builder.add_node("double", |_ctx, mut s: SumState| async move {
        s.total = 2;
        Ok(s)
    });
    builder.add_node("triple", |_ctx, mut s: SumState| async move {
        s.total = 3;
        Ok(s)
    });
    builder.add_node("collect", |_ctx, s: SumState| async move { Ok(s) });
    builder.add_edge("dispatch", "double");
    builder.add_edge("dispatch", "triple");
    builder.add_edge("double", "collect");
    builder.add_edge("triple", "collect");
    builder.add_edge("collect", END);
    builder.set_entry("dispatch");
    builder.set_branch_hook(Arc::new(NoopHook));

    let graph = builder.compile().unwrap();
    assert!(graph.has_parallel_execution());

    let result = graph
        .run(ExecutionContext::default(), SumState::default(), RunOptions::new())
        .await
        .unwrap();

    assert_eq!(result.total, 5);
}

#[tokio::test]
async fn fork_join_fail_fast_aborts_on_first_branch_error() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("dispatch", |_ctx, s: Counter| async move { Ok(s) });
    builder.add_node("ok_branch", |_ctx, s: Counter| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(record("ok_branch", s))
    });
    builder.add_node("bad_branch", |_ctx, _s: Counter| async move {
        Err::<Counter, _>("branch failed".into())
    });
    builder.add_node("collect", |_ctx, s: Counter| async move { Ok(s) });
    builder.add_edge("dispatch", "ok_branch");
    builder.add_edge("dispatch", "bad_branch");
    builder.add_edge("ok_branch", "collect");
    builder.add_edge("bad_branch", "collect");
    builder.add_edge("collect", END);
    builder.set_entry("dispatch");
    builder.set_fork_join_config(
        flowgraph_core::ForkJoinConfig::default().with_fail_fast(true),
    );

    let graph = builder.compile().unwrap();
    let err = graph
        .run(ExecutionContext::default(), Counter::default(), RunOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err.error, FlowError::ForkJoin { .. }));
}

#[test]
fn empty_graph_fails_compilation_with_no_entry_point() {
    let builder: GraphBuilder<Counter> = GraphBuilder::new();
    let err = builder.compile().unwrap_err();
    match err {
        FlowError::Validation(issues) => {
            assert!(issues.contains(&ValidationIssue::NoEntryPoint));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn single_node_straight_to_end_compiles() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("only", |_ctx, s: Counter| async move { Ok(s) });
    builder.add_edge("only", END);
    builder.set_entry("only");
    assert!(builder.compile().is_ok());
}

#[test]
fn pure_cycle_with_no_exit_fails_compilation() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("a", |_ctx, s: Counter| async move { Ok(s) });
    builder.add_node("b", |_ctx, s: Counter| async move { Ok(s) });
    builder.add_edge("a", "b");
    builder.add_edge("b", "a");
    builder.set_entry("a");

    let err = builder.compile().unwrap_err();
    match err {
        FlowError::Validation(issues) => {
            assert!(issues.contains(&ValidationIssue::NoPathToEnd));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn max_iterations_is_enforced_on_an_infinite_conditional_loop() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("spin", |_ctx, s: Counter| async move {
        Ok(Counter { value: s.value + 1, ..s })
    });
    builder.add_conditional_edge("spin", |_ctx, _s: Counter| async move { "spin".to_string() });
    builder.set_entry("spin");

    let graph = builder.compile().unwrap();
    let options = RunOptions::new().with_max_iterations(5);
    let err = graph
        .run(ExecutionContext::default(), Counter::default(), options)
        .await
        .unwrap_err();

    assert!(matches!(err.error, FlowError::MaxIterations { max: 5, .. }));
    assert_eq!(err.state.value, 5);
}

#[tokio::test]
async fn router_returning_empty_string_is_an_error() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("a", |_ctx, s: Counter| async move { Ok(s) });
    builder.add_conditional_edge("a", |_ctx, _s: Counter| async move { String::new() });
    builder.set_entry("a");

    let graph = builder.compile().unwrap();
    let err = graph
        .run(ExecutionContext::default(), Counter::default(), RunOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err.error,
        FlowError::RouterError { cause: flowgraph_core::RouterErrorCause::InvalidRouterResult, .. }
    ));
}

#[tokio::test]
async fn router_returning_unknown_node_is_an_error() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("a", |_ctx, s: Counter| async move { Ok(s) });
    builder.add_conditional_edge("a", |_ctx, _s: Counter| async move { "ghost".to_string() });
    builder.set_entry("a");

    let graph = builder.compile().unwrap();
    let err = graph
        .run(ExecutionContext::default(), Counter::default(), RunOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err.error,
        FlowError::RouterError { cause: flowgraph_core::RouterErrorCause::RouterTargetNotFound, .. }
    ));
}

#[tokio::test]
async fn cancellation_before_a_node_runs_is_reported_as_not_executing() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("a", |_ctx, s: Counter| async move { Ok(record("a", s)) });
    builder.add_edge("a", END);
    builder.set_entry("a");

    let graph = builder.compile().unwrap();
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let ctx = flowgraph_core::ContextOptions::new()
        .with_run_id("cancel-test")
        .with_cancellation(token)
        .build();

    let err = graph.run(ctx, Counter::default(), RunOptions::new()).await.unwrap_err();
    assert!(matches!(
        err.error,
        FlowError::Cancellation { was_executing: false, .. }
    ));
}

#[tokio::test]
async fn node_panic_is_caught_and_reported() {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("boom", |_ctx, _s: Counter| async move {
        panic!("node blew up");
        #[allow(unreachable_code)]
        Ok(Counter::default())
    });
    builder.add_edge("boom", END);
    builder.set_entry("boom");

    let graph = builder.compile().unwrap();
    let err = graph
        .run(ExecutionContext::default(), Counter::default(), RunOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err.error, FlowError::Panic { .. }));
}

#[test]
fn clone_via_json_round_trips_nested_state() {
    let original = Counter { value: 7, path: vec!["a".into(), "b".into()] };
    let cloned: Counter = clone_via_json(&original).unwrap();
    assert_eq!(original, cloned);
}

#[tokio::test]
async fn overlapping_non_nested_forks_are_rejected_at_compile_time() {
    let mut builder = GraphBuilder::<Counter>::new();
    for id in ["fork1", "fork2", "p", "q", "r", "j1", "j2"] {
        builder.add_node(id, |_ctx, s: Counter| async move { Ok(s) });
    }
    builder.add_edge("fork1", "p");
    builder.add_edge("fork1", "q");
    builder.add_edge("fork2", "q");
    builder.add_edge("fork2", "r");
    builder.add_edge("p", "j1");
    builder.add_edge("q", "j1");
    builder.add_edge("r", "j2");
    builder.add_edge("j1", "j2");
    builder.add_edge("j2", END);
    builder.set_entry("fork1");

    let err = builder.compile().unwrap_err();
    match err {
        FlowError::Validation(issues) => {
            assert!(issues.iter().any(|i| matches!(i, ValidationIssue::OverlappingForks(_))));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

fn build_checkpointed_linear_graph() -> CompiledGraph<Counter> {
    let mut builder = GraphBuilder::<Counter>::new();
    builder.add_node("a", |_ctx, s: Counter| async move { Ok(record("a", s)) });
    builder.add_node("b", |_ctx, s: Counter| async move { Ok(record("b", s)) });
    builder.add_edge("a", "b");
    builder.add_edge("b", END);
    builder.set_entry("a");
    builder.compile().unwrap()
}

#[tokio::test]
async fn checkpoint_sequence_is_monotonically_increasing() {
    let graph = build_checkpointed_linear_graph();
    let store = Arc::new(InMemoryCheckpointStore::new());
    let run_id = "run-sequence".to_string();
    let options = RunOptions::new()
        .with_run_id(run_id.clone())
        .with_checkpointing(store.clone() as Arc<dyn flowgraph_checkpoint::CheckpointStore>);

    graph
        .run(ExecutionContext::default(), Counter::default(), options)
        .await
        .unwrap();

    let infos = flowgraph_checkpoint::CheckpointStore::list(store.as_ref(), &run_id).await.unwrap();
    assert_eq!(infos.len(), 2);
    assert!(infos[0].sequence < infos[1].sequence);
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn linear_graph_of(n: usize) -> CompiledGraph<Counter> {
        let mut builder = GraphBuilder::<Counter>::new();
        for i in 0..n {
            builder.add_node(format!("n{i}"), |_ctx, mut s: Counter| async move {
                s.value += 1;
                Ok(s)
            });
        }
        for i in 0..n.saturating_sub(1) {
            builder.add_edge(format!("n{i}"), format!("n{}", i + 1));
        }
        builder.add_edge(format!("n{}", n - 1), END);
        builder.set_entry("n0");
        builder.compile().unwrap()
    }

    proptest! {
        #[test]
        fn linear_graph_of_n_nodes_increments_value_by_n(n in 1usize..12) {
            let graph = linear_graph_of(n);
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let result = runtime.block_on(graph.run(
                ExecutionContext::default(),
                Counter::default(),
                RunOptions::new(),
            )).unwrap();
            prop_assert_eq!(result.value, n as i64);
        }
    }

    proptest! {
        #[test]
        fn resume_without_replay_never_re_executes_the_last_checkpointed_node(n in 2usize..8) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let graph = linear_graph_of(n);
                let store = Arc::new(InMemoryCheckpointStore::new());
                let run_id = format!("run-proptest-{n}");
                let options = RunOptions::new()
                    .with_run_id(run_id.clone())
                    .with_checkpointing(store.clone() as Arc<dyn flowgraph_checkpoint::CheckpointStore>);

                graph
                    .run(ExecutionContext::default(), Counter::default(), options)
                    .await
                    .unwrap();

                let resumed = graph
                    .resume(
                        ExecutionContext::default(),
                        run_id,
                        store as Arc<dyn flowgraph_checkpoint::CheckpointStore>,
                        ResumeOptions::new(),
                    )
                    .await
                    .unwrap();

                assert_eq!(resumed.value, n as i64);
            });
        }
    }
}
