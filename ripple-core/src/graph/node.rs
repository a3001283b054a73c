//! Graph Nodes
//!
//! This module defines the bookkeeping every reactive node carries: its
//! identity, kind, dirty state, version, and the edges to the nodes it reads
//! from and the nodes that read from it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::reactive::Reactive;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A mutable leaf. Has dependents, never dependencies.
    Signal,

    /// A memoized derivation. Has both dependencies and dependents.
    Computed,

    /// A terminal subscriber. Has dependencies but no dependents.
    Effect,

    /// An async adapter. Depends on its declared dependencies and is read
    /// like a source by everything downstream.
    AsyncBridge,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Signal => "signal",
            NodeKind::Computed => "computed",
            NodeKind::Effect => "effect",
            NodeKind::AsyncBridge => "async signal",
        };
        f.write_str(name)
    }
}

/// Dirty state of a node.
///
/// Ordered so that marking can only raise the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// The node might need to recompute. One of its dependencies changed,
    /// but we have not yet verified if the actual input values are different.
    MaybeDirty,

    /// The node definitely needs to recompute. Its inputs have changed.
    Dirty,
}

/// A recorded read: the node that was read and its version at that time.
#[derive(Clone)]
pub(crate) struct Edge {
    pub(crate) id: NodeId,
    pub(crate) node: Arc<dyn Reactive>,
    pub(crate) version: u64,
}

impl Edge {
    pub(crate) fn new(id: NodeId, node: Arc<dyn Reactive>, version: u64) -> Self {
        Self { id, node, version }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("id", &self.id)
            .field("version", &self.version)
            .finish()
    }
}

pub(crate) type Dependencies = SmallVec<[Edge; 4]>;

/// Graph bookkeeping for one reactive node.
///
/// Dependencies are held strongly so a derivation keeps its inputs alive;
/// dependents are held weakly so a source never keeps its readers alive.
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Optional human-readable label.
    label: Option<Arc<str>>,

    /// Current dirty state.
    dirty: DirtyState,

    /// Incremented every time the node's observable output changes.
    version: u64,

    disposed: bool,

    /// Nodes that this node read during its last evaluation.
    dependencies: Dependencies,

    /// Nodes that read this node during their last evaluation.
    dependents: IndexMap<NodeId, Weak<dyn Reactive>>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind, label: Option<Arc<str>>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            label,
            dirty: match kind {
                NodeKind::Signal | NodeKind::AsyncBridge => DirtyState::Clean,
                // Start dirty to ensure first computation
                NodeKind::Computed | NodeKind::Effect => DirtyState::Dirty,
            },
            version: 0,
            disposed: false,
            dependencies: SmallVec::new(),
            dependents: IndexMap::new(),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the node's label, if any.
    pub fn label(&self) -> Option<&Arc<str>> {
        self.label.as_ref()
    }

    /// Get the current dirty state.
    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    /// Check if the node needs any processing.
    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty (a dependency might have changed).
    pub fn mark_maybe_dirty(&mut self) {
        self.mark(DirtyState::MaybeDirty);
    }

    /// Mark the node as definitely dirty (needs recomputation).
    pub fn mark_dirty(&mut self) {
        self.mark(DirtyState::Dirty);
    }

    /// Raise the dirty state to at least `level`.
    pub fn mark(&mut self, level: DirtyState) {
        self.dirty = self.dirty.max(level);
    }

    /// Current output version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record an observable change and return the new version.
    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_disposed(&mut self) {
        self.disposed = true;
    }

    pub(crate) fn dependencies(&self) -> &[Edge] {
        &self.dependencies
    }

    /// IDs of the nodes this node currently depends on.
    pub fn dependency_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dependencies.iter().map(|edge| edge.id)
    }

    /// Number of dependencies recorded during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Swap in a freshly recorded dependency set, returning the old one.
    pub(crate) fn replace_dependencies(&mut self, dependencies: Dependencies) -> Dependencies {
        std::mem::replace(&mut self.dependencies, dependencies)
    }

    /// Add a dependent (a node that reads from this node).
    pub(crate) fn add_dependent(&mut self, id: NodeId, node: Weak<dyn Reactive>) {
        self.dependents.insert(id, node);
    }

    /// Remove a dependent. Returns true if it was present and none remain.
    pub fn remove_dependent(&mut self, id: NodeId) -> bool {
        self.dependents.shift_remove(&id).is_some() && !self.has_dependents()
    }

    /// Live dependents, in subscription order.
    pub(crate) fn dependents(&self) -> Vec<Arc<dyn Reactive>> {
        self.dependents.values().filter_map(Weak::upgrade).collect()
    }

    /// Number of live dependents.
    pub fn dependent_count(&self) -> usize {
        self.dependents
            .values()
            .filter(|dependent| dependent.strong_count() > 0)
            .count()
    }

    pub fn has_dependents(&self) -> bool {
        self.dependent_count() > 0
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("dirty", &self.dirty)
            .field("version", &self.version)
            .field("disposed", &self.disposed)
            .field("dependencies", &self.dependencies.len())
            .field("dependents", &self.dependents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::TestNode;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn node_id_displays_with_hash() {
        assert_eq!(NodeId::from(7).to_string(), "#7");
    }

    #[test]
    fn signal_node_starts_clean() {
        let node = Node::new(NodeKind::Signal, None);
        assert_eq!(node.kind(), NodeKind::Signal);
        assert!(node.is_clean());
    }

    #[test]
    fn computed_node_starts_dirty() {
        let node = Node::new(NodeKind::Computed, Some("total".into()));
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
        assert_eq!(node.label().map(|l| &**l), Some("total"));
    }

    #[test]
    fn dirty_state_transitions() {
        let mut node = Node::new(NodeKind::Computed, None);

        node.mark_clean();
        assert_eq!(node.dirty_state(), DirtyState::Clean);

        node.mark_maybe_dirty();
        assert_eq!(node.dirty_state(), DirtyState::MaybeDirty);

        node.mark_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);

        // Marking never lowers the level
        node.mark_maybe_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn dependent_management() {
        let source = TestNode::new(NodeKind::Signal);
        let reader = TestNode::new(NodeKind::Effect);
        let reader_id = reader.id();
        let weak: Weak<dyn Reactive> = Arc::downgrade(&reader) as Weak<dyn Reactive>;

        source.node.lock().add_dependent(reader_id, weak);
        assert_eq!(source.node.lock().dependent_count(), 1);

        assert!(source.node.lock().remove_dependent(reader_id));
        assert!(!source.node.lock().has_dependents());

        // Removing twice reports nothing
        assert!(!source.node.lock().remove_dependent(reader_id));
    }

    #[test]
    fn dead_dependents_are_not_counted() {
        let source = TestNode::new(NodeKind::Signal);
        {
            let reader = TestNode::new(NodeKind::Effect);
            let weak: Weak<dyn Reactive> = Arc::downgrade(&reader) as Weak<dyn Reactive>;
            source.node.lock().add_dependent(reader.id(), weak);
            assert_eq!(source.node.lock().dependent_count(), 1);
        }
        assert_eq!(source.node.lock().dependent_count(), 0);
        assert!(source.node.lock().dependents().is_empty());
    }

    #[test]
    fn versions_increase() {
        let mut node = Node::new(NodeKind::Signal, None);
        assert_eq!(node.version(), 0);
        assert_eq!(node.bump_version(), 1);
        assert_eq!(node.bump_version(), 2);
    }
}
