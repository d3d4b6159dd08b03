//! Static validation of a [`crate::graph::GraphBuilder`].
//!
//! Walks edges and conditional edges once, collecting every violation
//! found rather than stopping at the first, then lets the caller decide
//! whether to aggregate them into a single [`crate::error::FlowError::Validation`].

use std::collections::{HashSet, VecDeque};

use crate::error::ValidationIssue;
use crate::graph::GraphBuilder;
use crate::ids::{is_end, NodeId, END};

/// Everything [`validate`] found: hard violations plus non-fatal
/// unreachable-from-entry warnings.
pub(crate) struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub unreachable: Vec<NodeId>,
}

/// Run every structural check against `builder`.
pub(crate) fn validate<S: Clone + Send + Sync + 'static>(builder: &GraphBuilder<S>) -> ValidationReport {
    let mut issues = Vec::new();

    // Invariant 1: entry set and names an existing node.
    match builder.entry() {
        None => issues.push(ValidationIssue::NoEntryPoint),
        Some(entry) if !builder.has_node(entry) => {
            issues.push(ValidationIssue::EntryNotFound(entry.clone()))
        }
        Some(_) => {}
    }

    // Invariants 2 & 3: every edge source/target exists.
    for source in builder.edge_sources() {
        if !builder.has_node(source) {
            // Sources only ever come from add_edge/add_conditional_edge,
            // both of which validate identifier shape; a missing node
            // here means the source itself was never added as a node.
            issues.push(ValidationIssue::NodeNotFound {
                from: source.clone(),
                target: source.clone(),
            });
        }
        for target in builder.simple_targets(source) {
            if !is_end(target) && !builder.has_node(target) {
                issues.push(ValidationIssue::NodeNotFound {
                    from: source.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    // Invariant 4: a path from entry to END exists, optimistically
    // assuming a conditional router may return END.
    if let Some(entry) = builder.entry() {
        if builder.has_node(entry) && !reaches_end(builder, entry) {
            issues.push(ValidationIssue::NoPathToEnd);
        }
    }

    // Invariant 6: nodes unreachable from entry are a warning, not a
    // compile failure.
    let unreachable = if let Some(entry) = builder.entry() {
        if builder.has_node(entry) {
            unreachable_from_entry(builder, entry)
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };

    ValidationReport { issues, unreachable }
}

/// Reverse propagation from `END` : mark `END` reachable,
/// then repeatedly mark any node whose simple-edge list contains a marked
/// target, or any conditional source (routers are assumed able to reach
/// `END` optimistically). Returns whether `entry` is ultimately marked.
fn reaches_end<S: Clone + Send + Sync + 'static>(builder: &GraphBuilder<S>, entry: &str) -> bool {
    let mut reachable: HashSet<NodeId> = HashSet::new();
    reachable.insert(END.to_string());

    loop {
        let mut changed = false;
        for id in builder.node_ids() {
            if reachable.contains(id) {
                continue;
            }
            if builder.is_conditional(id) {
                // Optimistic: a router may return END.
                reachable.insert(id.clone());
                changed = true;
                continue;
            }
            let targets = builder.simple_targets(id);
            if targets.iter().any(|t| is_end(t) || reachable.contains(t)) {
                reachable.insert(id.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    reachable.contains(entry)
}

/// Forward BFS from `entry` along simple edges; visiting a conditional
/// node marks every other node reachable too, since a router may jump
/// anywhere. Returns the node ids never marked.
fn unreachable_from_entry<S: Clone + Send + Sync + 'static>(
    builder: &GraphBuilder<S>,
    entry: &str,
) -> Vec<NodeId> {
    let all: HashSet<NodeId> = builder.node_ids().cloned().collect();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    queue.push_back(entry.to_string());
    visited.insert(entry.to_string());

    while let Some(current) = queue.pop_front() {
        if builder.is_conditional(&current) {
            for id in &all {
                if visited.insert(id.clone()) {
                    queue.push_back(id.clone());
                }
            }
            continue;
        }
        for target in builder.simple_targets(&current) {
            if is_end(target) {
                continue;
            }
            if visited.insert(target.clone()) {
                queue.push_back(target.clone());
            }
        }
    }

    all.difference(&visited).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeOutcome;

    fn noop_node<S: Clone + Send + Sync + 'static>(
        _ctx: crate::context::ExecutionContext,
        state: S,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = NodeOutcome<S>> + Send>> {
        Box::pin(async move { Ok(state) })
    }

    #[test]
    fn missing_entry_reports_no_entry_point() {
        let builder: GraphBuilder<()> = GraphBuilder::new();
        let report = validate(&builder);
        assert!(report.issues.contains(&ValidationIssue::NoEntryPoint));
    }

    #[test]
    fn cycle_without_conditional_has_no_path_to_end() {
        let mut builder: GraphBuilder<()> = GraphBuilder::new();
        builder.add_node("a", noop_node);
        builder.add_node("b", noop_node);
        builder.add_edge("a", "b");
        builder.add_edge("b", "a");
        builder.set_entry("a");
        let report = validate(&builder);
        assert!(report.issues.contains(&ValidationIssue::NoPathToEnd));
    }

    #[test]
    fn cycle_with_conditional_exit_has_path_to_end() {
        let mut builder: GraphBuilder<()> = GraphBuilder::new();
        builder.add_node("a", noop_node);
        builder.add_conditional_edge("a", |_ctx, _s| async { "a".to_string() });
        builder.set_entry("a");
        let report = validate(&builder);
        assert!(!report.issues.contains(&ValidationIssue::NoPathToEnd));
    }

    #[test]
    fn unreachable_node_is_a_warning_not_an_issue() {
        let mut builder: GraphBuilder<()> = GraphBuilder::new();
        builder.add_node("a", noop_node);
        builder.add_node("orphan", noop_node);
        builder.add_edge("a", "__end__");
        builder.set_entry("a");
        let report = validate(&builder);
        assert!(report.issues.is_empty());
        assert_eq!(report.unreachable, vec!["orphan".to_string()]);
    }
}
