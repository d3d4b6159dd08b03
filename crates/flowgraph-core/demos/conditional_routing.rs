//! Conditional routing demo
//!
//! Routes execution based on a field of the state rather than a fixed
//! simple edge.

use flowgraph_core::{ExecutionContext, GraphBuilder, RunOptions, END};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Item {
    value: i64,
    operation: String,
}

impl flowgraph_core::ParallelState for Item {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Conditional Routing Demo ===\n");

    let mut builder = GraphBuilder::<Item>::new();

    builder.add_node("router", |_ctx, state: Item| async move {
        println!("router: examining state...");
        Ok(state)
    });

    builder.add_node("multiply", |_ctx, mut state: Item| async move {
        println!("taking multiply path...");
        state.value *= 2;
        state.operation = "multiply".to_string();
        Ok(state)
    });

    builder.add_node("add", |_ctx, mut state: Item| async move {
        println!("taking add path...");
        state.value += 100;
        state.operation = "add".to_string();
        Ok(state)
    });

    builder.add_conditional_edge("router", |_ctx, state: Item| async move {
        if state.value >= 0 { "multiply".to_string() } else { "add".to_string() }
    });
    builder.add_edge("multiply", END);
    builder.add_edge("add", END);
    builder.set_entry("router");

    let graph = builder.compile()?;

    for input in [Item { value: 5, operation: String::new() }, Item { value: -5, operation: String::new() }] {
        println!("\nInitial state: {input:?}");
        let result = graph
            .run(ExecutionContext::default(), input, RunOptions::new())
            .await
            .map_err(|e| e.error)?;
        println!("Final state: {result:?}");
    }

    Ok(())
}
