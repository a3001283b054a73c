//! Dependency Graph
//!
//! This module implements the bookkeeping that ties reactive values and
//! computations together.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent reactive values (signals, async signals) or
//!   computations (computeds, effects)
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them as stale. The propagation pass then determines which stale
//! nodes actually need to recompute.
//!
//! # Design Decisions
//!
//! 1. Edges live on the nodes themselves rather than in a central table:
//!    - a node's dependency set is rebuilt from scratch on every evaluation
//!    - dropping the last handle to a node is enough to remove it
//!
//! 2. Dependencies are strong references, dependents are weak. A source
//!    never keeps its readers alive.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub(crate) use node::{Dependencies, Edge};
pub(crate) use scheduler::UpdateScheduler;

#[cfg(test)]
pub(crate) mod testing {
    //! A bare node used to exercise graph bookkeeping without real values.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Weak};

    use parking_lot::Mutex;

    use super::{Edge, Node, NodeId, NodeKind};
    use crate::reactive::Reactive;

    pub(crate) struct TestNode {
        pub(crate) node: Mutex<Node>,
        pub(crate) recomputes: AtomicUsize,
    }

    impl TestNode {
        pub(crate) fn new(kind: NodeKind) -> Arc<Self> {
            Arc::new(Self {
                node: Mutex::new(Node::new(kind, None)),
                recomputes: AtomicUsize::new(0),
            })
        }

        pub(crate) fn id(&self) -> NodeId {
            self.node.lock().id()
        }
    }

    impl Reactive for TestNode {
        fn node(&self) -> &Mutex<Node> {
            &self.node
        }

        fn recompute(&self) {
            self.recomputes.fetch_add(1, Ordering::SeqCst);
            self.node.lock().mark_clean();
        }
    }

    /// Record that `dependent` reads `dependency`.
    pub(crate) fn link(dependency: &Arc<TestNode>, dependent: &Arc<TestNode>) {
        let weak: Weak<dyn Reactive> = Arc::downgrade(dependent) as Weak<dyn Reactive>;
        let version = {
            let mut node = dependency.node.lock();
            node.add_dependent(dependent.id(), weak);
            node.version()
        };
        let edge = Edge::new(dependency.id(), dependency.clone(), version);
        let mut node = dependent.node.lock();
        let mut dependencies: super::Dependencies = node.dependencies().iter().cloned().collect();
        dependencies.push(edge);
        node.replace_dependencies(dependencies);
    }
}
