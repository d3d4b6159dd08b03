//! The immutable, execution-ready compiled graph.
//!
//! A [`CompiledGraph`] is a deep copy of a [`crate::graph::GraphBuilder`]
//! plus the derivatives precomputed at compile time: successor/predecessor
//! maps, conditional flags, and fork/join analysis. It is deeply immutable
//! and freely shareable across concurrent `run` calls.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FlowError, Result};
use crate::forkjoin;
use crate::graph::GraphBuilder;
use crate::ids::{NodeId, END};
use crate::node::{BranchHook, NodeFn, RouterFn};
use crate::options::ForkJoinConfig;
use crate::validate;

/// A fork node's precomputed branch list and join target.
#[derive(Debug, Clone)]
pub struct ForkNode {
    pub branches: Vec<NodeId>,
    pub join_node_id: Option<NodeId>,
}

/// A join node's precomputed owning fork and expected arity.
#[derive(Debug, Clone)]
pub struct JoinNode {
    pub fork_node_id: NodeId,
    pub expected_branches: usize,
}

/// The compiled, execution-ready plan produced by [`GraphBuilder::compile`].
pub struct CompiledGraph<S> {
    pub(crate) nodes: HashMap<NodeId, NodeFn<S>>,
    pub(crate) successors: HashMap<NodeId, Vec<NodeId>>,
    pub(crate) predecessors: HashMap<NodeId, Vec<NodeId>>,
    pub(crate) routers: HashMap<NodeId, RouterFn<S>>,
    pub(crate) is_conditional: HashMap<NodeId, bool>,
    pub(crate) fork_nodes: HashMap<NodeId, ForkNode>,
    pub(crate) join_nodes: HashMap<NodeId, JoinNode>,
    pub(crate) entry: NodeId,
    pub(crate) has_parallel_execution: bool,
    pub(crate) branch_hook: Option<Arc<dyn BranchHook<S>>>,
    pub(crate) fork_join_config: ForkJoinConfig,
}

impl<S: Clone + Send + Sync + 'static> CompiledGraph<S> {
    pub(crate) fn from_builder(builder: &GraphBuilder<S>) -> Result<Self> {
        let validation = validate::validate(builder);
        let fj = forkjoin::detect(builder);

        let mut issues = validation.issues;
        issues.extend(fj.issues);
        if !issues.is_empty() {
            return Err(FlowError::Validation(issues));
        }

        for id in &validation.unreachable {
            tracing::warn!(node_id = %id, "node is unreachable from the entry point");
        }

        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut predecessors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut is_conditional: HashMap<NodeId, bool> = HashMap::new();

        for id in builder.node_ids() {
            let targets = builder.simple_targets(id).to_vec();
            for target in &targets {
                predecessors.entry(target.clone()).or_default().push(id.clone());
            }
            is_conditional.insert(id.clone(), builder.is_conditional(id));
            successors.insert(id.clone(), targets);
        }

        let fork_nodes: HashMap<NodeId, ForkNode> = fj
            .forks
            .into_iter()
            .map(|(id, info)| {
                (
                    id,
                    ForkNode {
                        branches: info.branches,
                        join_node_id: info.join_node_id,
                    },
                )
            })
            .collect();

        let join_nodes: HashMap<NodeId, JoinNode> = fj
            .joins
            .into_iter()
            .map(|(id, info)| {
                (
                    id,
                    JoinNode {
                        fork_node_id: info.fork_node_id,
                        expected_branches: info.expected_branches,
                    },
                )
            })
            .collect();

        let has_parallel_execution = !fork_nodes.is_empty();

        Ok(Self {
            nodes: builder.nodes_map().clone(),
            successors,
            predecessors,
            routers: builder.routers_map(),
            is_conditional,
            fork_nodes,
            join_nodes,
            entry: builder
                .entry()
                .cloned()
                .expect("validated: entry is set when issues is empty"),
            has_parallel_execution,
            branch_hook: builder.branch_hook(),
            fork_join_config: builder.fork_join_config(),
        })
    }

    // -- Introspection -----------------------------------

    pub fn entry_point(&self) -> &str {
        &self.entry
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn successors(&self, id: &str) -> &[NodeId] {
        self.successors.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: &str) -> &[NodeId] {
        self.predecessors.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_conditional(&self, id: &str) -> bool {
        self.is_conditional.get(id).copied().unwrap_or(false)
    }

    pub fn is_fork_node(&self, id: &str) -> bool {
        self.fork_nodes.contains_key(id)
    }

    pub fn get_fork_node(&self, id: &str) -> Option<&ForkNode> {
        self.fork_nodes.get(id)
    }

    pub fn is_join_node(&self, id: &str) -> bool {
        self.join_nodes.contains_key(id)
    }

    pub fn get_join_node(&self, id: &str) -> Option<&JoinNode> {
        self.join_nodes.get(id)
    }

    pub fn has_parallel_execution(&self) -> bool {
        self.has_parallel_execution
    }

    pub(crate) fn node_fn(&self, id: &str) -> Option<&NodeFn<S>> {
        self.nodes.get(id)
    }

    pub(crate) fn router_fn(&self, id: &str) -> Option<&RouterFn<S>> {
        self.routers.get(id)
    }
}

/// Named for symmetry with [`crate::ids::END`]: a convenience re-export so
/// callers composing routers don't need a separate import just for the
/// sentinel.
pub const TERMINAL: &str = END;
