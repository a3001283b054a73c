//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is re-run in the same
//!    propagation pass, after every computed it reads is up to date.
//!
//! 3. Each run tracks dependencies from scratch; sources that were not read
//!    this time are unsubscribed.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Lifetime
//!
//! Sources only hold weak references to their effects. Dropping the last
//! handle to an effect disposes it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::runtime::{self, Reactive, StaleOnUnwind};
use crate::graph::{Node, NodeId, NodeKind};

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
///
/// use ripple_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Arc::new(AtomicI32::new(-1));
///
/// let (source, sink) = (count.clone(), seen.clone());
/// let _effect = Effect::new(move || sink.store(source.get(), Ordering::SeqCst));
/// assert_eq!(seen.load(Ordering::SeqCst), 0);
///
/// count.set(5);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    node: Mutex<Node>,

    /// The effect function.
    run: Box<dyn Fn() + Send + Sync>,

    weak_self: Weak<EffectInner>,

    /// Number of times the effect has run to completion.
    run_count: AtomicUsize,
}

impl Reactive for EffectInner {
    fn node(&self) -> &Mutex<Node> {
        &self.node
    }

    fn recompute(&self) {
        let id = {
            let node = self.node.lock();
            if node.is_disposed() {
                return;
            }
            node.id()
        };
        tracing::trace!(effect = %id, "running");

        // Cleared before the run so writes made by the body re-schedule it.
        let stale = StaleOnUnwind::begin(&self.node);
        let ctx = ReactiveContext::enter(id, NodeKind::Effect);
        (self.run)();
        let dependencies = ctx.finish();
        stale.complete();

        let weak: Weak<dyn Reactive> = self.weak_self.clone();
        runtime::rewire(id, self, &weak, dependencies);
        self.run_count.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        runtime::release(self.node.get_mut());
    }
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new labeled effect. Runs immediately, like [`new`](Self::new).
    pub fn labeled<F>(label: impl Into<Arc<str>>, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::build(Some(label.into()), Box::new(run));
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies, and so never runs, until the first
    /// [`execute`](Self::execute).
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(None, Box::new(run))
    }

    fn build(label: Option<Arc<str>>, run: Box<dyn Fn() + Send + Sync>) -> Self {
        Self {
            inner: Arc::new_cyclic(|weak_self| EffectInner {
                node: Mutex::new(Node::new(NodeKind::Effect, label)),
                run,
                weak_self: weak_self.clone(),
                run_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.node.lock().id()
    }

    /// Run the effect function now, re-tracking its dependencies.
    ///
    /// Does nothing once the effect is disposed.
    pub fn execute(&self) {
        let _graph = runtime::exclusive();
        self.inner.recompute();
    }

    /// Dispose of the effect.
    ///
    /// It unsubscribes from every source and will not run again.
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
        tracing::debug!(effect = %id, "disposed");
        runtime::detach(id, &*self.inner);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.node.lock().is_disposed()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.node.lock().dependency_count()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, Computed, Signal};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let _effect = Effect::new(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Effect should have run once on creation
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new_lazy(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Effect should not have run
        assert_eq!(run_count.load(Ordering::SeqCst), 0);
        assert_eq!(effect.run_count(), 0);

        // Manually execute
        effect.execute();
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let signal = Signal::new(1);
        let seen = Arc::new(AtomicI32::new(0));
        let (source, sink) = (signal.clone(), seen.clone());

        let effect = Effect::new(move || {
            sink.store(source.get(), Ordering::SeqCst);
        });
        assert_eq!(effect.dependency_count(), 1);

        signal.set(2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        signal.set(3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));
        let (source, run_count_clone) = (signal.clone(), run_count.clone());

        let effect = Effect::new(move || {
            source.get();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Ran once on creation
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        // Dispose
        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(signal.subscriber_count(), 0);

        // A write should not run it
        signal.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        // Execute should not run
        effect.execute();
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_last_handle_disposes() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));
        let (source, run_count_clone) = (signal.clone(), run_count.clone());

        let effect = Effect::new(move || {
            source.get();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        let other = effect.clone();
        drop(effect);

        signal.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);

        drop(other);
        assert_eq!(signal.subscriber_count(), 0);
        signal.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batched_writes_run_effect_once() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        let sums = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (a_source, b_source, sink) = (a.clone(), b.clone(), sums.clone());

        let _effect = Effect::new(move || {
            sink.lock().push(a_source.get() + b_source.get());
        });

        batch(|| {
            a.set(1);
            b.set(2);
        });

        assert_eq!(*sums.lock(), vec![0, 3]);
    }

    #[test]
    fn effect_skips_when_computed_is_unchanged() {
        let x = Signal::new(2);
        let source = x.clone();
        let is_even = Computed::new(move || source.get() % 2 == 0);
        let run_count = Arc::new(AtomicI32::new(0));
        let (reader, run_count_clone) = (is_even.clone(), run_count.clone());

        let _effect = Effect::new(move || {
            reader.get();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        x.set(4);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        x.set(5);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_effect_does_not_block_siblings() {
        let signal = Signal::new(0);
        let sibling_runs = Arc::new(AtomicI32::new(0));

        let failing_source = signal.clone();
        let _failing = Effect::new(move || {
            assert!(failing_source.get() < 1, "too large");
        });
        let (sibling_source, sibling_runs_clone) = (signal.clone(), sibling_runs.clone());
        let _sibling = Effect::new(move || {
            sibling_source.get();
            sibling_runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| signal.set(1)));
        assert!(result.is_err());
        assert_eq!(sibling_runs.load(Ordering::SeqCst), 2);

        // Still subscribed, so it retries on the next write
        signal.set(0);
        assert_eq!(sibling_runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn effect_tracks_run_count() {
        let effect = Effect::new(|| {});

        assert_eq!(effect.run_count(), 1);

        effect.execute();
        assert_eq!(effect.run_count(), 2);

        effect.execute();
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        // Same ID
        assert_eq!(effect1.id(), effect2.id());

        // Shared run count
        assert_eq!(effect1.run_count(), 1);
        assert_eq!(effect2.run_count(), 1);

        effect1.execute();
        assert_eq!(effect1.run_count(), 2);
        assert_eq!(effect2.run_count(), 2);

        // Shared disposal state
        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
