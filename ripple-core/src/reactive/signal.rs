//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal's value changes, all subscribers are marked stale.
//!
//! 3. The runtime re-runs the affected computations, once per batch.
//!
//! # Equality
//!
//! A write only counts as a change if the new value is observably different
//! from the current one. What "different" means is chosen per signal:
//! [`Signal::new`] uses `PartialEq`, [`Signal::with_equality`] takes a custom
//! comparator (useful for identity comparison of shared containers), and
//! [`Signal::always_notify`] treats every write as a change.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::runtime::{self, Reactive};
use super::subscriber::{Subscription, Trackable};
use super::Effect;
use crate::error::{ReactiveError, Result};
use crate::graph::{Edge, Node, NodeId, NodeKind};
use crate::observer;

type Equality<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    node: Mutex<Node>,
    value: RwLock<T>,
    equals: Equality<T>,
}

impl<T> Reactive for SignalInner<T>
where
    T: Send + Sync + 'static,
{
    fn node(&self) -> &Mutex<Node> {
        &self.node
    }

    fn recompute(&self) {
        // A signal has no inputs; it is never stale.
        self.node.lock().mark_clean();
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::build(None, value, Box::new(|a: &T, b: &T| a == b))
    }

    /// Create a new signal with a human-readable label.
    pub fn labeled(label: impl Into<Arc<str>>, value: T) -> Self {
        Self::build(Some(label.into()), value, Box::new(|a: &T, b: &T| a == b))
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal that decides "changed" with a custom comparator.
    ///
    /// `equals(old, new)` returning true suppresses the write.
    pub fn with_equality<F>(value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self::build(None, value, Box::new(equals))
    }

    /// Create a signal where every write notifies, even of an equal value.
    pub fn always_notify(value: T) -> Self {
        Self::build(None, value, Box::new(|_: &T, _: &T| false))
    }

    fn build(label: Option<Arc<str>>, value: T, equals: Equality<T>) -> Self {
        let node = Node::new(NodeKind::Signal, label);
        observer::signal_created(node.id(), node.label());

        Self {
            inner: Arc::new(SignalInner {
                node: Mutex::new(node),
                value: RwLock::new(value),
                equals,
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.node.lock().id()
    }

    /// Get the signal's label, if it has one.
    pub fn label(&self) -> Option<Arc<str>> {
        self.inner.node.lock().label().cloned()
    }

    /// Number of writes that changed the value.
    pub fn version(&self) -> u64 {
        self.inner.node.lock().version()
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        let _graph = runtime::exclusive();
        self.track_read();
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning it. Tracks like [`get`](Self::get).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _graph = runtime::exclusive();
        self.track_read();
        f(&self.inner.value.read())
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self) -> T {
        let _graph = runtime::exclusive();
        self.inner.value.read().clone()
    }

    /// Alias for [`get_untracked`](Self::get_untracked).
    pub fn peek(&self) -> T {
        self.get_untracked()
    }

    /// Set a new value and notify subscribers.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a computed derivation; see
    /// [`try_set`](Self::try_set).
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    /// Set a new value, returning whether it counted as a change.
    ///
    /// Fails with [`ReactiveError::WriteInComputed`] when called from inside
    /// a computed derivation.
    pub fn try_set(&self, value: T) -> Result<bool> {
        let (id, label) = {
            let node = self.inner.node.lock();
            (node.id(), node.label().cloned())
        };
        if let Some(computed) = ReactiveContext::current_computed() {
            return Err(ReactiveError::WriteInComputed {
                signal: id,
                computed,
            });
        }

        let _graph = runtime::exclusive();
        {
            let mut current = self.inner.value.write();
            if (self.inner.equals)(&current, &value) {
                return Ok(false);
            }
            *current = value;
        }

        let version = self.inner.node.lock().bump_version();
        tracing::trace!(signal = %id, version, "signal written");
        {
            let value = self.inner.value.read();
            observer::signal_updated(id, label.as_ref(), &*value);
        }

        runtime::notify_changed(&*self.inner);
        Ok(true)
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.read());
        self.set(new_value);
    }

    /// Call `f` with the current value now and after every change.
    ///
    /// Dropping the returned [`Subscription`] stops the calls.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let signal = self.clone();
        Subscription::new(Effect::new(move || f(&signal.get())))
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.node.lock().dependent_count()
    }

    fn track_read(&self) {
        if !ReactiveContext::is_active() {
            return;
        }
        let (id, version) = {
            let node = self.inner.node.lock();
            (node.id(), node.version())
        };
        ReactiveContext::track(Edge::new(id, self.inner.clone(), version));
    }
}

impl<T> Trackable for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn track(&self) {
        self.track_read();
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn equal_writes_are_ignored() {
        let signal = Signal::new(3);
        assert_eq!(signal.try_set(3), Ok(false));
        assert_eq!(signal.version(), 0);

        assert_eq!(signal.try_set(4), Ok(true));
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn always_notify_counts_every_write() {
        let signal = Signal::always_notify(1);
        signal.set(1);
        signal.set(1);
        assert_eq!(signal.version(), 2);
    }

    #[test]
    fn custom_equality_is_used() {
        // Compare only by length
        let signal = Signal::with_equality(vec![1, 2], |a: &Vec<i32>, b: &Vec<i32>| {
            a.len() == b.len()
        });
        signal.set(vec![3, 4]);
        assert_eq!(signal.get(), vec![1, 2]);

        signal.set(vec![5]);
        assert_eq!(signal.get(), vec![5]);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let _subscription = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Subscribing delivers the current value once
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 1);

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let subscription = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        drop(subscription);
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(2);
        // Should not have been called again
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn labels_are_kept() {
        let signal = Signal::labeled("count", 0);
        assert_eq!(signal.label().as_deref(), Some("count"));
        assert!(Signal::new(0).label().is_none());
    }

    #[test]
    fn reads_outside_evaluation_do_not_subscribe() {
        let signal = Signal::new(0);
        signal.get();
        assert_eq!(signal.subscriber_count(), 0);
    }
}
