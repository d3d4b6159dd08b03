//! Fork/join analyzer: detects fork nodes and computes each fork's
//! post-dominator join.
//!
//! The analysis is a simplified post-dominator computation: BFS
//! forward-reachability per branch, intersected, with the nearest
//! candidate (by distance from the first branch) chosen as the join. It
//! handles single-fork/single-join and cleanly nested forks reliably;
//! overlapping, non-nested forks are rejected rather than guessed at.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::ValidationIssue;
use crate::graph::GraphBuilder;
use crate::ids::{is_end, NodeId};

/// One fork's analysis result.
#[derive(Debug, Clone)]
pub(crate) struct ForkInfo {
    pub branches: Vec<NodeId>,
    pub join_node_id: Option<NodeId>,
}

/// One join's analysis result.
#[derive(Debug, Clone)]
pub(crate) struct JoinInfo {
    pub fork_node_id: NodeId,
    pub expected_branches: usize,
}

pub(crate) struct ForkJoinReport {
    pub forks: HashMap<NodeId, ForkInfo>,
    pub joins: HashMap<NodeId, JoinInfo>,
    pub issues: Vec<ValidationIssue>,
}

/// Run fork/join detection over every node in `builder`.
pub(crate) fn detect<S: Clone + Send + Sync + 'static>(builder: &GraphBuilder<S>) -> ForkJoinReport {
    let mut forks: HashMap<NodeId, ForkInfo> = HashMap::new();
    let mut issues = Vec::new();

    // Step 1: a node with >=2 simple targets that is not conditional is a
    // fork; its branches are the target list.
    for id in builder.node_ids() {
        let targets = builder.simple_targets(id);
        if targets.len() >= 2 && !builder.is_conditional(id) {
            let branches: Vec<NodeId> = targets.to_vec();
            let join_node_id = compute_join(builder, &branches);
            if join_node_id.is_none() {
                issues.push(ValidationIssue::NoJoinForFork(id.clone()));
            }
            forks.insert(id.clone(), ForkInfo { branches, join_node_id });
        }
    }

    // Overlap detection: two forks whose branch spans intersect without
    // one nesting cleanly inside the other.
    issues.extend(detect_overlaps(builder, &forks));

    let mut joins: HashMap<NodeId, JoinInfo> = HashMap::new();
    for (fork_id, info) in &forks {
        if let Some(join_id) = &info.join_node_id {
            joins.insert(
                join_id.clone(),
                JoinInfo {
                    fork_node_id: fork_id.clone(),
                    expected_branches: info.branches.len(),
                },
            );
        }
    }

    ForkJoinReport { forks, joins, issues }
}

/// Forward-reachable sets per branch, intersected, nearest candidate
/// chosen by distance from the first branch.
fn compute_join<S: Clone + Send + Sync + 'static>(
    builder: &GraphBuilder<S>,
    branches: &[NodeId],
) -> Option<NodeId> {
    if branches.is_empty() {
        return None;
    }

    let mut per_branch_reachable: Vec<HashSet<NodeId>> = Vec::with_capacity(branches.len());
    let mut first_branch_distance: HashMap<NodeId, usize> = HashMap::new();

    for (i, branch) in branches.iter().enumerate() {
        let (reachable, distances) = forward_reachable_with_distance(builder, branch);
        if i == 0 {
            first_branch_distance = distances;
        }
        per_branch_reachable.push(reachable);
    }

    let mut candidates = per_branch_reachable[0].clone();
    for set in &per_branch_reachable[1..] {
        candidates = candidates.intersection(set).cloned().collect();
    }

    candidates
        .into_iter()
        .min_by_key(|c| first_branch_distance.get(c).copied().unwrap_or(usize::MAX))
}

/// BFS forward along simple edges from `start` (inclusive), ignoring
/// `END`. Returns the reachable set and each node's distance from
/// `start`.
fn forward_reachable_with_distance<S: Clone + Send + Sync + 'static>(
    builder: &GraphBuilder<S>,
    start: &str,
) -> (HashSet<NodeId>, HashMap<NodeId, usize>) {
    let mut visited = HashSet::new();
    let mut distance = HashMap::new();
    let mut queue = VecDeque::new();

    visited.insert(start.to_string());
    distance.insert(start.to_string(), 0usize);
    queue.push_back(start.to_string());

    while let Some(current) = queue.pop_front() {
        let d = distance[&current];
        let next_targets: Vec<NodeId> = if builder.is_conditional(&current) {
            Vec::new()
        } else {
            builder.simple_targets(&current).to_vec()
        };
        for target in next_targets {
            if is_end(&target) {
                continue;
            }
            if visited.insert(target.clone()) {
                distance.insert(target.clone(), d + 1);
                queue.push_back(target);
            }
        }
    }

    (visited, distance)
}

/// The set of nodes belonging to a fork's region: everything
/// forward-reachable from its branches, stopping at (and excluding) its
/// join. If the fork has no join, the whole reachable set is its region
/// (already flagged separately as [`ValidationIssue::NoJoinForFork`]).
fn fork_region<S: Clone + Send + Sync + 'static>(
    builder: &GraphBuilder<S>,
    info: &ForkInfo,
) -> HashSet<NodeId> {
    let mut region = HashSet::new();
    for branch in &info.branches {
        let (reachable, _) = forward_reachable_with_distance(builder, branch);
        for node in reachable {
            if info.join_node_id.as_deref() == Some(node.as_str()) {
                continue;
            }
            region.insert(node);
        }
    }
    region
}

fn detect_overlaps<S: Clone + Send + Sync + 'static>(
    builder: &GraphBuilder<S>,
    forks: &HashMap<NodeId, ForkInfo>,
) -> Vec<ValidationIssue> {
    let mut flagged: HashSet<NodeId> = HashSet::new();
    let regions: HashMap<NodeId, HashSet<NodeId>> = forks
        .iter()
        .map(|(id, info)| (id.clone(), fork_region(builder, info)))
        .collect();

    let ids: Vec<&NodeId> = forks.keys().collect();
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (a, b) = (ids[i], ids[j]);
            let region_a = &regions[a];
            let region_b = &regions[b];
            if region_a.is_disjoint(region_b) {
                continue;
            }
            // Nested: b's fork node sits inside a's region and b's whole
            // region is contained in a's (or symmetrically).
            let b_nested_in_a = region_a.contains(b) && region_b.is_subset(region_a);
            let a_nested_in_b = region_b.contains(a) && region_a.is_subset(region_b);
            if !b_nested_in_a && !a_nested_in_b {
                flagged.insert(a.clone());
                flagged.insert(b.clone());
            }
        }
    }

    if flagged.is_empty() {
        Vec::new()
    } else {
        let mut ids: Vec<NodeId> = flagged.into_iter().collect();
        ids.sort();
        vec![ValidationIssue::OverlappingForks(ids)]
    }
}
