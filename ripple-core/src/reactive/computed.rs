//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its derivation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the computed is marked "dirty" (direct
//!    input) or "maybe dirty" (input of an input).
//!
//! 4. On next access, a maybe-dirty computed re-checks whether any input's
//!    version actually moved.
//!
//! 5. If inputs changed, recompute. Otherwise, mark clean and return cache.
//!
//! The dependency set is rebuilt from scratch on every evaluation, so a
//! derivation that only reads a signal under some condition stops depending
//! on it once the condition no longer holds.
//!
//! # Failures
//!
//! A derivation that panics leaves the computed dirty, with its previous
//! value and dependencies intact. The panic reaches whoever triggered the
//! evaluation and the next read retries.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use super::context::ReactiveContext;
use super::runtime::{self, Reactive, StaleOnUnwind};
use super::subscriber::{Subscription, Trackable};
use super::Effect;
use crate::error::{ReactiveError, Result};
use crate::graph::{DirtyState, Edge, Node, NodeId, NodeKind};
use crate::observer;

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some derivations return the same value even if inputs changed),
/// in which case dependents are left alone.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let source = count.clone();
/// let doubled = Computed::new(move || source.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    node: Mutex<Node>,

    /// The derivation.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (None if never computed or disposed).
    value: RwLock<Option<T>>,

    weak_self: Weak<ComputedInner<T>>,

    /// Number of times the derivation ran to completion.
    evaluations: AtomicUsize,
}

impl<T> Reactive for ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn node(&self) -> &Mutex<Node> {
        &self.node
    }

    fn recompute(&self) {
        let (id, label) = {
            let node = self.node.lock();
            (node.id(), node.label().cloned())
        };
        tracing::trace!(computed = %id, "evaluating");

        let stale = StaleOnUnwind::begin(&self.node);
        let ctx = ReactiveContext::enter(id, NodeKind::Computed);
        let value = (self.compute)();
        let dependencies = ctx.finish();
        stale.complete();

        let weak: Weak<dyn Reactive> = self.weak_self.clone();
        runtime::rewire(id, self, &weak, dependencies);
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let mut slot = self.value.write();
        if (*slot).as_ref() == Some(&value) {
            return;
        }
        *slot = Some(value);
        let slot = RwLockWriteGuard::downgrade(slot);
        self.node.lock().bump_version();
        if let Some(value) = &*slot {
            observer::computed_updated(id, label.as_ref(), value);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        runtime::release(self.node.get_mut());
    }
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new computed with the given derivation.
    ///
    /// The derivation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(None, Box::new(compute))
    }

    /// Create a new computed with a human-readable label.
    pub fn labeled<F>(label: impl Into<Arc<str>>, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Some(label.into()), Box::new(compute))
    }

    fn build(label: Option<Arc<str>>, compute: Box<dyn Fn() -> T + Send + Sync>) -> Self {
        let node = Node::new(NodeKind::Computed, label);
        observer::computed_created(node.id(), node.label());

        Self {
            inner: Arc::new_cyclic(|weak_self| ComputedInner {
                node: Mutex::new(node),
                compute,
                value: RwLock::new(None),
                weak_self: weak_self.clone(),
                evaluations: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.node.lock().id()
    }

    /// Get the computed's label, if it has one.
    pub fn label(&self) -> Option<Arc<str>> {
        self.inner.node.lock().label().cloned()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a computed's value.
    ///
    /// # Panics
    ///
    /// Panics if the computed was disposed or reads itself; see
    /// [`try_get`](Self::try_get). A panic from the derivation propagates.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, reporting misuse as an error.
    pub fn try_get(&self) -> Result<T> {
        let _graph = runtime::exclusive();
        let id = self.observe()?;
        self.inner
            .value
            .read()
            .clone()
            .ok_or(ReactiveError::Disposed {
                id,
                kind: NodeKind::Computed,
            })
    }

    /// Get the current value without tracking it as a dependency.
    ///
    /// The value is still brought up to date first.
    pub fn get_untracked(&self) -> T {
        runtime::untracked(|| self.get())
    }

    /// Alias for [`get_untracked`](Self::get_untracked).
    pub fn peek(&self) -> T {
        self.get_untracked()
    }

    /// Bring the value up to date and record the read.
    fn observe(&self) -> Result<NodeId> {
        let (id, disposed) = {
            let node = self.inner.node.lock();
            (node.id(), node.is_disposed())
        };
        if disposed {
            return Err(ReactiveError::Disposed {
                id,
                kind: NodeKind::Computed,
            });
        }
        if ReactiveContext::is_evaluating(id) {
            return Err(ReactiveError::Cycle { id });
        }

        runtime::ensure_fresh(&*self.inner);

        if ReactiveContext::is_active() {
            let version = self.inner.node.lock().version();
            ReactiveContext::track(Edge::new(id, self.inner.clone(), version));
        }
        Ok(id)
    }

    /// Call `f` with the current value now and after every change.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let computed = self.clone();
        Subscription::new(Effect::new(move || f(&computed.get())))
    }

    /// Dispose of the computed.
    ///
    /// It unsubscribes from its dependencies, drops its cached value and
    /// invalidates everything that read it. Later reads fail with
    /// [`ReactiveError::Disposed`].
    pub fn dispose(&self) {
        let _graph = runtime::exclusive();
        let id = {
            let mut node = self.inner.node.lock();
            if node.is_disposed() {
                return;
            }
            node.set_disposed();
            node.id()
        };
        tracing::debug!(computed = %id, "disposed");

        runtime::detach(id, &*self.inner);
        self.inner.value.write().take();
        runtime::notify_changed(&*self.inner);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.node.lock().is_disposed()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        self.inner.node.lock().dirty_state()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of times the derivation has run to completion.
    pub fn evaluation_count(&self) -> usize {
        self.inner.evaluations.load(Ordering::Relaxed)
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        self.inner.node.lock().dependent_count()
    }

    /// Number of sources read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.node.lock().dependency_count()
    }
}

impl<T> Trackable for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn track(&self) {
        if let Err(err) = self.observe() {
            panic!("{err}");
        }
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
