//! Simple graph demo
//!
//! Builds a three-node linear workflow and runs it to completion.

use flowgraph_core::{ExecutionContext, GraphBuilder, RunOptions, END};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Counter {
    value: i64,
}

impl flowgraph_core::ParallelState for Counter {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Simple Graph Demo ===\n");

    let mut builder = GraphBuilder::<Counter>::new();

    builder.add_node("step1", |_ctx, mut state: Counter| async move {
        println!("Executing step1...");
        state.value += 10;
        println!("step1 complete. value = {}", state.value);
        Ok(state)
    });

    builder.add_node("step2", |_ctx, mut state: Counter| async move {
        println!("Executing step2...");
        state.value *= 2;
        println!("step2 complete. value = {}", state.value);
        Ok(state)
    });

    builder.add_edge("step1", "step2");
    builder.add_edge("step2", END);
    builder.set_entry("step1");

    let graph = builder.compile()?;

    let input = Counter { value: 5 };
    println!("Initial state: {input:?}\n");

    let result = graph.run(ExecutionContext::default(), input, RunOptions::new()).await.map_err(|e| e.error)?;

    println!("\nFinal state: {result:?}");
    println!("Expected: value = (5 + 10) * 2 = 30");
    println!("Actual: value = {}", result.value);

    Ok(())
}
