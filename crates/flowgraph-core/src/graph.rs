//! The mutable graph builder.
//!
//! `GraphBuilder` accumulates nodes, edges, conditional routers, the entry
//! point, and optional parallel configuration. It is not safe for
//! concurrent mutation — ordinary `&mut self` methods are sufficient,
//! there is no internal locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::ids::{is_end, validate_identifier, NodeId, END};
use crate::node::{BoxFuture, BranchHook, NodeFn, NodeOutcome, RouterFn};
use crate::options::ForkJoinConfig;

/// One edge kind a source node may carry: zero-or-more unconditional
/// targets, or a single conditional router. Both may be present.
#[derive(Default)]
struct EdgeConfig<S> {
    simple_targets: Vec<NodeId>,
    router: Option<RouterFn<S>>,
}

/// Mutable builder for a flowgraph workflow.
///
/// `S` is the user-chosen state type threaded through the graph.
/// Construction and edge bookkeeping never require more than
/// `Clone + Send + Sync + 'static` — the stronger bounds
/// ([`crate::state::ParallelState`], `Serialize + DeserializeOwned`)
/// attach only to [`crate::compiled::CompiledGraph::run`] /
/// [`crate::resume::resume`] (see `DESIGN.md`).
pub struct GraphBuilder<S> {
    nodes: HashMap<NodeId, NodeFn<S>>,
    edges: HashMap<NodeId, EdgeConfig<S>>,
    entry: Option<NodeId>,
    branch_hook: Option<Arc<dyn BranchHook<S>>>,
    fork_join_config: ForkJoinConfig,
}

impl<S> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            branch_hook: None,
            fork_join_config: ForkJoinConfig::default(),
        }
    }
}

impl<S: Clone + Send + Sync + 'static> GraphBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node function under `id`.
    ///
    /// Panics if `id` is empty, contains whitespace, collides with the
    /// reserved `END` sentinel, or is already registered. These are
    /// programmer mistakes in the graph definition, not recoverable
    /// runtime conditions.
    pub fn add_node<F, Fut>(&mut self, id: impl Into<NodeId>, f: F) -> &mut Self
    where
        F: Fn(ExecutionContext, S) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = NodeOutcome<S>> + Send + 'static,
    {
        let id = id.into();
        if let Err(reason) = validate_identifier(&id) {
            panic!("flowgraph: invalid node id {id:?}: {reason}");
        }
        if self.nodes.contains_key(&id) {
            panic!("flowgraph: node {id:?} is already registered");
        }
        let boxed: NodeFn<S> = Arc::new(move |ctx, state| -> BoxFuture<'static, NodeOutcome<S>> {
            Box::pin(f(ctx, state))
        });
        self.nodes.insert(id, boxed);
        self
    }

    /// Add a simple (unconditional) edge from `from` to `to`. `to` may
    /// name another node or `END`. Multiple calls with the same `from`
    /// accumulate targets in call order; two or more targets on a
    /// non-conditional source make `from` a fork node.
    ///
    /// Panics if `from` or `to` is an empty or whitespace-containing
    /// identifier — existence of the nodes themselves is checked later,
    /// at [`compile`](Self::compile).
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        let from = from.into();
        let to = to.into();
        if !is_end(&from) {
            if let Err(reason) = validate_identifier(&from) {
                panic!("flowgraph: invalid edge source {from:?}: {reason}");
            }
        }
        if !is_end(&to) {
            if let Err(reason) = validate_identifier(&to) {
                panic!("flowgraph: invalid edge target {to:?}: {reason}");
            }
        }
        self.edges.entry(from).or_default().simple_targets.push(to);
        self
    }

    /// Add a conditional edge from `from`, routed at runtime by `router`.
    /// At most one conditional edge is meaningful per source; a second
    /// call for the same `from` replaces the first.
    pub fn add_conditional_edge<F, Fut>(&mut self, from: impl Into<NodeId>, router: F) -> &mut Self
    where
        F: Fn(ExecutionContext, S) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = String> + Send + 'static,
    {
        let from = from.into();
        if let Err(reason) = validate_identifier(&from) {
            panic!("flowgraph: invalid conditional edge source {from:?}: {reason}");
        }
        let boxed: RouterFn<S> = Arc::new(move |ctx, state| -> BoxFuture<'static, String> {
            Box::pin(router(ctx, state))
        });
        self.edges.entry(from).or_default().router = Some(boxed);
        self
    }

    /// Set the graph's entry node. Panics if `id` is structurally invalid;
    /// existence of the node is checked at [`compile`](Self::compile).
    pub fn set_entry(&mut self, id: impl Into<NodeId>) -> &mut Self {
        let id = id.into();
        if let Err(reason) = validate_identifier(&id) {
            panic!("flowgraph: invalid entry id {id:?}: {reason}");
        }
        self.entry = Some(id);
        self
    }

    /// Install a branch hook invoked around fork/join regions.
    pub fn set_branch_hook(&mut self, hook: Arc<dyn BranchHook<S>>) -> &mut Self {
        self.branch_hook = Some(hook);
        self
    }

    /// Configure fork/join concurrency and failure policy.
    pub fn set_fork_join_config(&mut self, config: ForkJoinConfig) -> &mut Self {
        self.fork_join_config = config;
        self
    }

    pub(crate) fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub(crate) fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn entry(&self) -> Option<&NodeId> {
        self.entry.as_ref()
    }

    pub(crate) fn simple_targets(&self, from: &str) -> &[NodeId] {
        self.edges
            .get(from)
            .map(|e| e.simple_targets.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn router(&self, from: &str) -> Option<&RouterFn<S>> {
        self.edges.get(from).and_then(|e| e.router.as_ref())
    }

    pub(crate) fn is_conditional(&self, id: &str) -> bool {
        self.edges.get(id).map(|e| e.router.is_some()).unwrap_or(false)
    }

    pub(crate) fn edge_sources(&self) -> impl Iterator<Item = &NodeId> {
        self.edges.keys()
    }

    pub(crate) fn nodes_map(&self) -> &HashMap<NodeId, NodeFn<S>> {
        &self.nodes
    }

    pub(crate) fn routers_map(&self) -> HashMap<NodeId, RouterFn<S>> {
        self.edges
            .iter()
            .filter_map(|(id, e)| e.router.clone().map(|r| (id.clone(), r)))
            .collect()
    }

    pub(crate) fn branch_hook(&self) -> Option<Arc<dyn BranchHook<S>>> {
        self.branch_hook.clone()
    }

    pub(crate) fn fork_join_config(&self) -> ForkJoinConfig {
        self.fork_join_config.clone()
    }

    /// Validate the builder and, on success, produce an immutable,
    /// execution-ready [`crate::compiled::CompiledGraph`].
    ///
    /// The builder remains usable afterward — `compile` deep-copies
    /// builder state into the compiled plan rather than consuming `self`.
    pub fn compile(&self) -> Result<crate::compiled::CompiledGraph<S>> {
        crate::compiled::CompiledGraph::from_builder(self)
    }
}
