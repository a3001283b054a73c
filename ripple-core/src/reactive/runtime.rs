//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! effects and async signals. It owns the per-thread propagation state and
//! schedules updates when sources change.
//!
//! # How It Works
//!
//! 1. When a computed or effect reads a source within its evaluation, the
//!    read is recorded and the reader subscribes to the source.
//!
//! 2. When a source's value changes, the runtime:
//!    a. Marks direct dependents dirty and their computed descendants
//!       maybe-dirty
//!    b. Runs a propagation pass, unless a batch is open
//!    c. The pass visits stale nodes in topological order; effects re-run if
//!       an input actually changed, computeds without readers stay lazy
//!
//! 3. Reading a stale computed outside a pass pulls it up to date first.
//!
//! # Threading
//!
//! Propagation bookkeeping is thread-local, but every mutation of the graph
//! (a write, a batch, a pull of a stale node, an async result) runs under
//! one process-wide reentrant lock. A batch or pass in progress on one
//! thread therefore runs to completion before another thread can apply
//! anything, and other threads never see a half-applied batch.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};

use super::context::ReactiveContext;
use crate::error::{ReactiveError, Result};
use crate::graph::{Dependencies, DirtyState, Node, NodeId, NodeKind, UpdateScheduler};

/// A node the runtime can bring up to date.
///
/// Implemented by the inner state of every reactive type. Propagation looks
/// at the node's [`NodeKind`] to decide what to do; `recompute` is only
/// called once the runtime has decided an update is needed.
pub(crate) trait Reactive: Send + Sync {
    /// Graph bookkeeping for this node.
    fn node(&self) -> &Mutex<Node>;

    /// Re-evaluate the node. Only called when it is stale and at least one
    /// dependency actually changed.
    fn recompute(&self);

    /// Called when the last dependent unsubscribed.
    fn on_unobserved(&self) {}
}

/// Tuning knobs for the per-thread runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on propagation passes in one flush. Effects that keep
    /// writing to their own inputs hit this limit instead of spinning forever.
    pub max_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_passes: 100 }
    }
}

struct RuntimeState {
    config: RuntimeConfig,
    batch_depth: usize,
    flushing: bool,
    scheduler: UpdateScheduler,
}

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState {
        config: RuntimeConfig::default(),
        batch_depth: 0,
        flushing: false,
        scheduler: UpdateScheduler::new(),
    });
}

static GRAPH: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// Hold exclusive access to the graph until the guard drops.
///
/// Reentrant, so nested writes and passes on the same thread go through.
/// Never hold the guard across an `.await`.
pub(crate) fn exclusive() -> ReentrantMutexGuard<'static, ()> {
    GRAPH.lock()
}

/// The reactive runtime for the current thread.
pub struct Runtime;

impl Runtime {
    /// Replace this thread's runtime configuration.
    pub fn configure(config: RuntimeConfig) {
        RUNTIME.with(|rt| rt.borrow_mut().config = config);
    }

    /// This thread's runtime configuration.
    pub fn config() -> RuntimeConfig {
        RUNTIME.with(|rt| rt.borrow().config.clone())
    }

    /// Get the node currently recording reads, if any.
    pub fn current_observer() -> Option<NodeId> {
        ReactiveContext::current_observer()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Check if a batch is open on this thread.
    pub fn is_batching() -> bool {
        RUNTIME.with(|rt| rt.borrow().batch_depth > 0)
    }

    /// Number of stale nodes waiting for the next pass.
    pub fn pending_count() -> usize {
        RUNTIME.with(|rt| rt.borrow().scheduler.pending_count())
    }
}

/// Run `f` with all writes deferred until it returns.
///
/// Stale marks from every write inside the batch are coalesced, and a single
/// propagation pass runs when the outermost batch exits, also when `f`
/// panics.
///
/// Nesting is allowed: an inner `batch` does not flush on exit, its writes
/// join the outermost batch and propagate together with it.
///
/// While a batch is open the graph is held exclusively by this thread, so
/// async results arriving on other threads wait until it has flushed.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{batch, Effect, Signal};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let count = Signal::new(0);
/// let runs = Arc::new(AtomicUsize::new(0));
/// let (reader, runs_clone) = (count.clone(), runs.clone());
/// let _effect = Effect::new(move || {
///     reader.get();
///     runs_clone.fetch_add(1, Ordering::SeqCst);
/// });
///
/// batch(|| {
///     count.set(1);
///     batch(|| count.set(2));
///     assert_eq!(runs.load(Ordering::SeqCst), 1);
/// });
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// ```
///
/// # Panics
///
/// Panics when called from inside a computed derivation; see [`try_batch`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    match try_batch(f) {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

/// Like [`batch`], but reports misuse instead of panicking.
pub fn try_batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    if let Some(computed) = ReactiveContext::current_computed() {
        return Err(ReactiveError::BatchInComputed { computed });
    }

    let _graph = exclusive();
    RUNTIME.with(|rt| rt.borrow_mut().batch_depth += 1);
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    let outermost = RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        rt.batch_depth = rt.batch_depth.saturating_sub(1);
        rt.batch_depth == 0
    });

    if outermost {
        flush();
    }

    match result {
        Ok(value) => Ok(value),
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Run `f` without recording any of its reads as dependencies.
///
/// The previous tracking context is restored afterwards, also when `f`
/// panics.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _scope = ReactiveContext::untracked();
    f()
}

/// Mark everything downstream of `source` stale and propagate, unless a
/// batch or pass is already in progress.
pub(crate) fn notify_changed(source: &dyn Reactive) {
    let _graph = exclusive();
    let should_flush = RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        rt.scheduler.mark_changed(source);
        rt.batch_depth == 0 && !rt.flushing
    });

    if should_flush {
        flush();
    }
}

/// Bring `reactive` up to date, pulling stale dependencies first.
pub(crate) fn ensure_fresh(reactive: &dyn Reactive) {
    let _graph = exclusive();
    let (state, dependencies) = {
        let node = reactive.node().lock();
        if node.is_disposed() {
            return;
        }
        let dependencies: Vec<_> = match node.dirty_state() {
            DirtyState::MaybeDirty => node.dependencies().to_vec(),
            _ => Vec::new(),
        };
        (node.dirty_state(), dependencies)
    };

    match state {
        DirtyState::Clean => return,
        DirtyState::Dirty => {}
        DirtyState::MaybeDirty => {
            let changed = dependencies.iter().any(|edge| {
                ensure_fresh(&*edge.node);
                edge.node.node().lock().version() != edge.version
            });
            if !changed {
                reactive.node().lock().mark_clean();
                return;
            }
        }
    }

    reactive.recompute();
}

/// Replace `this`'s dependency set with a freshly recorded one, subscribing
/// to new sources and unsubscribing from ones no longer read.
pub(crate) fn rewire(
    id: NodeId,
    this: &dyn Reactive,
    weak: &Weak<dyn Reactive>,
    dependencies: Dependencies,
) {
    for edge in &dependencies {
        edge.node.node().lock().add_dependent(id, weak.clone());
    }

    let old = this.node().lock().replace_dependencies(dependencies.clone());
    for edge in old {
        if !dependencies.iter().any(|current| current.id == edge.id) {
            unsubscribe(id, &*edge.node);
        }
    }
}

/// Drop every dependency of `this`.
pub(crate) fn detach(id: NodeId, this: &dyn Reactive) {
    let old = this.node().lock().replace_dependencies(Dependencies::new());
    for edge in old {
        unsubscribe(id, &*edge.node);
    }
}

/// Drop the dependencies of a node that is being destroyed.
pub(crate) fn release(node: &mut Node) {
    let id = node.id();
    for edge in node.replace_dependencies(Dependencies::new()) {
        unsubscribe(id, &*edge.node);
    }
}

fn unsubscribe(id: NodeId, source: &dyn Reactive) {
    let now_unobserved = source.node().lock().remove_dependent(id);
    if now_unobserved {
        source.on_unobserved();
    }
}

/// Marks a node dirty again if its evaluation unwinds.
pub(crate) struct StaleOnUnwind<'a> {
    node: &'a Mutex<Node>,
    armed: bool,
}

impl<'a> StaleOnUnwind<'a> {
    /// Mark `node` clean for the duration of an evaluation. Writes made by
    /// the evaluation itself can re-dirty it.
    pub(crate) fn begin(node: &'a Mutex<Node>) -> Self {
        node.lock().mark_clean();
        Self { node, armed: true }
    }

    pub(crate) fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for StaleOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.node.lock().mark_dirty();
        }
    }
}

struct FlushGuard;

impl FlushGuard {
    fn enter() -> Option<Self> {
        RUNTIME.with(|rt| {
            let mut rt = rt.borrow_mut();
            if rt.flushing {
                None
            } else {
                rt.flushing = true;
                Some(FlushGuard)
            }
        })
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        RUNTIME.with(|rt| rt.borrow_mut().flushing = false);
    }
}

/// Run propagation passes until nothing is stale.
///
/// A panic in one node does not stop the others; the first one is resumed
/// once the graph has settled.
fn flush() {
    let Some(guard) = FlushGuard::enter() else {
        return;
    };

    let max_passes = RUNTIME.with(|rt| rt.borrow().config.max_passes);
    let mut failure: Option<Box<dyn Any + Send>> = None;
    let mut passes = 0;

    loop {
        let ordered = RUNTIME.with(|rt| rt.borrow_mut().scheduler.take_ordered());
        if ordered.is_empty() {
            break;
        }

        passes += 1;
        if passes > max_passes {
            RUNTIME.with(|rt| rt.borrow_mut().scheduler.clear());
            drop(guard);
            panic!("{}", ReactiveError::FlushLimit { passes: max_passes });
        }
        tracing::debug!(pass = passes, nodes = ordered.len(), "propagation pass");

        for reactive in ordered {
            let (id, kind, should_run) = {
                let node = reactive.node().lock();
                let should_run = match node.kind() {
                    NodeKind::Signal => false,
                    // Unobserved computeds stay stale until someone reads them.
                    NodeKind::Computed => node.has_dependents(),
                    NodeKind::Effect | NodeKind::AsyncBridge => true,
                };
                (node.id(), node.kind(), should_run)
            };
            if !should_run {
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| ensure_fresh(&*reactive)));
            if let Err(payload) = outcome {
                tracing::warn!(node = %id, %kind, "evaluation panicked during propagation");
                failure.get_or_insert(payload);
            }
        }
    }

    drop(guard);
    if let Some(payload) = failure {
        panic::resume_unwind(payload);
    }
}
