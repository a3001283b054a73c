//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a computed or effect), we
//! push a frame onto the stack. When the computation completes, we pop it and
//! hand the recorded reads back to the caller.
//!
//! `untracked` pushes a frame with no owner: reads made while it is on top
//! are not recorded anywhere, even inside an outer evaluation.

use std::cell::RefCell;

use crate::graph::{Dependencies, Edge, NodeId, NodeKind};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The node being evaluated, or `None` for an untracked scope.
    owner: Option<(NodeId, NodeKind)>,
    /// Reads collected during this evaluation, deduplicated by node.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    owner: Option<NodeId>,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a tracking context for the given node.
    pub(crate) fn enter(id: NodeId, kind: NodeKind) -> Self {
        Self::push(Some((id, kind)))
    }

    /// Enter a scope in which reads are not recorded.
    pub(crate) fn untracked() -> Self {
        Self::push(None)
    }

    fn push(owner: Option<(NodeId, NodeKind)>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                owner,
                dependencies: Dependencies::new(),
            });
        });

        Self {
            owner: owner.map(|(id, _)| id),
            finished: false,
        }
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.owner.is_some())
        })
    }

    /// The node whose evaluation is recording reads right now, if any.
    pub fn current_observer() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.owner.map(|(id, _)| id))
        })
    }

    /// The innermost evaluation in progress, looking through untracked scopes.
    pub(crate) fn current_computed() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find_map(|entry| entry.owner)
                .filter(|(_, kind)| *kind == NodeKind::Computed)
                .map(|(id, _)| id)
        })
    }

    /// Whether `id` is somewhere on the stack, i.e. is reading itself.
    pub(crate) fn is_evaluating(id: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.owner.is_some_and(|(owner, _)| owner == id))
        })
    }

    /// Record a read in the innermost tracking frame.
    pub(crate) fn track(edge: Edge) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let Some(entry) = stack.last_mut() else {
                return;
            };
            if entry.owner.is_none() {
                return;
            }
            match entry.dependencies.iter_mut().find(|dep| dep.id == edge.id) {
                Some(existing) => existing.version = edge.version,
                None => entry.dependencies.push(edge),
            }
        });
    }

    /// Leave the context, returning the reads it recorded.
    pub(crate) fn finish(mut self) -> Dependencies {
        self.finished = true;
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            match popped {
                Some(entry) => {
                    debug_assert_eq!(entry.owner.map(|(id, _)| id), self.owner);
                    entry.dependencies
                }
                None => Dependencies::new(),
            }
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            // This helps catch bugs where contexts are mismatched.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.owner.map(|(id, _)| id),
                    self.owner,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::TestNode;

    fn edge_to(node: &std::sync::Arc<TestNode>) -> Edge {
        Edge::new(node.id(), node.clone(), 0)
    }

    #[test]
    fn context_tracks_observer() {
        let id = NodeId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_observer().is_none());

        {
            let _ctx = ReactiveContext::enter(id, NodeKind::Effect);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_observer(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_observer().is_none());
    }

    #[test]
    fn context_collects_dependencies_once() {
        let a = TestNode::new(NodeKind::Signal);
        let b = TestNode::new(NodeKind::Signal);

        let ctx = ReactiveContext::enter(NodeId::new(), NodeKind::Computed);
        ReactiveContext::track(edge_to(&a));
        ReactiveContext::track(edge_to(&b));
        ReactiveContext::track(edge_to(&a));

        let deps: Vec<NodeId> = ctx.finish().iter().map(|edge| edge.id).collect();
        assert_eq!(deps, vec![a.id(), b.id()]);
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1, NodeKind::Effect);
            assert_eq!(ReactiveContext::current_observer(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2, NodeKind::Computed);
                assert_eq!(ReactiveContext::current_observer(), Some(id2));
                assert_eq!(ReactiveContext::current_computed(), Some(id2));
                assert!(ReactiveContext::is_evaluating(id1));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_observer(), Some(id1));
            assert_eq!(ReactiveContext::current_computed(), None);
        }

        assert!(ReactiveContext::current_observer().is_none());
    }

    #[test]
    fn untracked_scope_hides_reads() {
        let a = TestNode::new(NodeKind::Signal);
        let outer = ReactiveContext::enter(NodeId::new(), NodeKind::Computed);
        {
            let _scope = ReactiveContext::untracked();
            assert!(!ReactiveContext::is_active());
            ReactiveContext::track(edge_to(&a));
        }
        assert!(outer.finish().is_empty());
    }

    #[test]
    fn untracked_scope_still_sees_enclosing_computed() {
        let id = NodeId::new();
        let _outer = ReactiveContext::enter(id, NodeKind::Computed);
        let _scope = ReactiveContext::untracked();
        assert_eq!(ReactiveContext::current_computed(), Some(id));
    }

    #[test]
    fn context_pops_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(NodeId::new(), NodeKind::Effect);
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
    }
}
