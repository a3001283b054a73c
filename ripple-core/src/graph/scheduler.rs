//! Update Scheduler
//!
//! The scheduler determines the order in which stale nodes should be updated.
//! It ensures that dependencies are always updated before their dependents.
//!
//! # Algorithm
//!
//! 1. When a source node changes, mark its direct dependents as "dirty"
//! 2. Propagate "maybe dirty" through computed dependents, recursively
//! 3. Collect every node reached into the pending set
//! 4. When the pass runs, sort the pending set topologically
//!    (dependencies before dependents)
//! 5. Process each node in order:
//!    - For "maybe dirty" nodes: check if any input actually changed
//!    - For "dirty" nodes: recompute
//!
//! Marking is eager, evaluation is deferred to the pass, so several writes
//! inside one batch collapse into a single evaluation per node.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use super::node::{DirtyState, NodeId, NodeKind};
use crate::reactive::Reactive;

/// Pending stale nodes waiting for the next propagation pass.
#[derive(Default)]
pub(crate) struct UpdateScheduler {
    pending: IndexMap<NodeId, Weak<dyn Reactive>>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub(crate) fn new() -> Self {
        Self {
            pending: IndexMap::new(),
        }
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    /// Mark everything downstream of `source` as stale.
    ///
    /// Direct dependents become dirty, everything reached through a computed
    /// becomes maybe-dirty. Effects and async signals end the walk: their
    /// own dependents only change once they publish a new state.
    pub(crate) fn mark_changed(&mut self, source: &dyn Reactive) {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<(Arc<dyn Reactive>, DirtyState)> = source
            .node()
            .lock()
            .dependents()
            .into_iter()
            .map(|dependent| (dependent, DirtyState::Dirty))
            .collect();

        // BFS to propagate maybe-dirty status
        while let Some((reactive, level)) = queue.pop_front() {
            let (id, kind, dependents) = {
                let mut node = reactive.node().lock();
                if node.is_disposed() {
                    continue;
                }
                node.mark(level);
                let dependents = if node.kind() == NodeKind::Computed {
                    node.dependents()
                } else {
                    Vec::new()
                };
                (node.id(), node.kind(), dependents)
            };

            if !visited.insert(id) {
                continue;
            }
            tracing::trace!(node = %id, %kind, ?level, "marked stale");
            self.pending.insert(id, Arc::downgrade(&reactive));

            for dependent in dependents {
                queue.push_back((dependent, DirtyState::MaybeDirty));
            }
        }
    }

    /// Drain the pending set in dependency order.
    ///
    /// Nodes that were dropped since they were marked are skipped.
    pub(crate) fn take_ordered(&mut self) -> Vec<Arc<dyn Reactive>> {
        let nodes: Vec<(NodeId, Arc<dyn Reactive>)> = self
            .pending
            .drain(..)
            .filter_map(|(id, weak)| weak.upgrade().map(|node| (id, node)))
            .collect();
        topological_sort(nodes)
    }
}

/// Perform a topological sort of the given nodes.
///
/// Returns nodes in order such that dependencies come before dependents.
/// Anything left over (only possible with a cycle) keeps its original order
/// at the end.
fn topological_sort(nodes: Vec<(NodeId, Arc<dyn Reactive>)>) -> Vec<Arc<dyn Reactive>> {
    let node_set: HashSet<NodeId> = nodes.iter().map(|(id, _)| *id).collect();
    let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
    let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut queue = VecDeque::new();

    // Calculate in-degrees (only counting edges within the node set)
    for (id, reactive) in &nodes {
        let dependencies: Vec<NodeId> = reactive
            .node()
            .lock()
            .dependency_ids()
            .filter(|dep| node_set.contains(dep))
            .collect();
        for dep in &dependencies {
            dependents.entry(*dep).or_default().push(*id);
        }
        in_degree.insert(*id, dependencies.len());
        if dependencies.is_empty() {
            queue.push_back(*id);
        }
    }

    // Kahn's algorithm
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for dependent in dependents.get(&id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    let mut by_id: HashMap<NodeId, Arc<dyn Reactive>> = HashMap::with_capacity(nodes.len());
    let mut original = Vec::with_capacity(nodes.len());
    for (id, reactive) in nodes {
        original.push(id);
        by_id.insert(id, reactive);
    }

    let mut result: Vec<Arc<dyn Reactive>> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();
    result.extend(original.into_iter().filter_map(|id| by_id.remove(&id)));
    result
}
