//! AsyncSignal Implementation
//!
//! An AsyncSignal turns a producer of futures or streams into a synchronous
//! reactive value holding an [`AsyncState`].
//!
//! # How AsyncSignals Work
//!
//! 1. The producer is a function returning a fresh stream. Each call is one
//!    attempt, and each attempt gets a new generation number.
//!
//! 2. The stream is consumed by a task on the tokio runtime that was current
//!    when the signal was built. Every item is applied to the state only if
//!    its generation is still the current one; results of superseded
//!    attempts are dropped.
//!
//! 3. Applying an item is a write: readers of the signal are invalidated and
//!    propagation runs on the thread that applied it, under the same graph
//!    lock as every other write. A result arriving while another thread has
//!    a batch open waits until that batch has flushed.
//!
//! 4. Declared dependencies are tracked like the reads of a computed. A
//!    change to any of them resets the signal and starts a new attempt.

use std::future::Future;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{AsyncError, AsyncOptions, AsyncState};
use crate::error::{ReactiveError, Result};
use crate::graph::{Edge, Node, NodeId, NodeKind};
use crate::reactive::{
    self, Effect, Reactive, ReactiveContext, StaleOnUnwind, Subscription, Trackable,
};

type Producer<T> = Box<dyn Fn() -> BoxStream<'static, Result<T, AsyncError>> + Send + Sync>;

type Transition<T> = fn(AsyncState<T>) -> AsyncState<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Phase {
    generation: u64,
    settled: bool,
}

/// A reactive value fed by an async producer.
///
/// # Example
///
/// ```rust
/// use ripple_core::bridge::{AsyncError, AsyncSignal};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let user = AsyncSignal::from_future(|| async { Ok::<_, AsyncError>("ada") }).build()?;
///
/// assert!(user.peek().is_loading());
/// let state = user.future().await?;
/// assert_eq!(state.value(), Some(&"ada"));
/// # Ok(())
/// # }
/// ```
pub struct AsyncSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<BridgeInner<T>>,
}

struct BridgeInner<T> {
    node: Mutex<Node>,
    state: RwLock<AsyncState<T>>,
    producer: Producer<T>,
    dependencies: Vec<Box<dyn Trackable>>,
    options: AsyncOptions,

    /// Bumped for every attempt and every cancellation.
    generation: AtomicU64,

    /// Whether an attempt has been started and not cancelled since.
    started: AtomicBool,

    task: Mutex<Option<JoinHandle<()>>>,
    phase: watch::Sender<Phase>,
    runtime: Handle,
    weak_self: Weak<BridgeInner<T>>,
}

impl<T> Reactive for BridgeInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node(&self) -> &Mutex<Node> {
        &self.node
    }

    /// A declared dependency changed.
    fn recompute(&self) {
        let stale = StaleOnUnwind::begin(&self.node);
        self.track_dependencies();
        stale.complete();

        if self.started.load(Ordering::SeqCst) {
            self.restart(AsyncState::reset, true);
        } else {
            // Not started yet: the first read will start from scratch.
            self.transition(AsyncState::reset, true);
        }
    }

    fn on_unobserved(&self) {
        let _graph = reactive::exclusive();
        if !self.options.auto_dispose || !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.cancel_task();
        self.phase.send_replace(Phase {
            generation,
            settled: true,
        });
        tracing::debug!(bridge = %self.id(), "no subscribers left, producer cancelled");
    }
}

impl<T> BridgeInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> NodeId {
        self.node.lock().id()
    }

    fn is_disposed(&self) -> bool {
        self.node.lock().is_disposed()
    }

    fn track_dependencies(&self) {
        let id = self.id();
        let ctx = ReactiveContext::enter(id, NodeKind::AsyncBridge);
        for dependency in &self.dependencies {
            dependency.track();
        }
        let dependencies = ctx.finish();

        let weak: Weak<dyn Reactive> = self.weak_self.clone();
        reactive::rewire(id, self, &weak, dependencies);
    }

    /// Start the producer if nothing is running.
    fn ensure_started(&self) {
        if self.is_disposed()
            || self
                .started
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return;
        }
        // The reader is about to look at the state, so nobody else needs
        // to hear about the loading flag.
        self.restart(AsyncState::refresh, false);
    }

    /// Supersede the current attempt with a new one.
    fn restart(&self, transition: Transition<T>, notify: bool) {
        let _graph = reactive::exclusive();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.started.store(true, Ordering::SeqCst);
        self.cancel_task();
        self.phase.send_replace(Phase {
            generation,
            settled: false,
        });
        self.transition(transition, notify);

        tracing::debug!(bridge = %self.id(), generation, "starting producer");
        let stream = reactive::untracked(|| (self.producer)());
        let bridge = self.weak_self.clone();
        let cancel_on_error = self.options.cancel_on_error;
        let task = self
            .runtime
            .spawn(drive(bridge, generation, stream, cancel_on_error));
        *self.task.lock() = Some(task);
    }

    fn cancel_task(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Replace the state and invalidate readers.
    fn transition(&self, f: impl FnOnce(AsyncState<T>) -> AsyncState<T>, notify: bool) {
        {
            let mut state = self.state.write();
            let current = mem::take(&mut *state);
            *state = f(current);
        }
        self.node.lock().bump_version();
        if notify {
            reactive::notify_changed(self);
        }
    }

    /// Apply a producer result, unless it belongs to a superseded attempt.
    ///
    /// Returns false when the result was dropped.
    fn apply(&self, generation: u64, f: impl FnOnce(AsyncState<T>) -> AsyncState<T>) -> bool {
        let _graph = reactive::exclusive();
        {
            let mut state = self.state.write();
            if self.generation.load(Ordering::SeqCst) != generation || self.is_disposed() {
                tracing::trace!(bridge = %self.id(), generation, "discarding stale result");
                return false;
            }
            let current = mem::take(&mut *state);
            *state = f(current);
        }
        self.node.lock().bump_version();
        self.phase.send_replace(Phase {
            generation,
            settled: true,
        });
        reactive::notify_changed(self);
        true
    }
}

impl<T> Drop for BridgeInner<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
        reactive::release(self.node.get_mut());
    }
}

/// Consume one attempt's stream.
async fn drive<T>(
    bridge: Weak<BridgeInner<T>>,
    generation: u64,
    mut stream: BoxStream<'static, Result<T, AsyncError>>,
    cancel_on_error: bool,
) where
    T: Clone + Send + Sync + 'static,
{
    while let Some(item) = stream.next().await {
        let Some(inner) = bridge.upgrade() else {
            return;
        };
        let failed = item.is_err();
        let applied = inner.apply(generation, move |state| match item {
            Ok(value) => state.emit(value),
            Err(error) => state.fail(error),
        });
        if !applied {
            return;
        }
        if failed && cancel_on_error {
            tracing::debug!(bridge = %inner.id(), generation, "producer failed, cancelled");
            return;
        }
    }

    if let Some(inner) = bridge.upgrade() {
        inner.apply(generation, AsyncState::complete);
    }
}

impl<T> AsyncSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Build an async signal from a producer of single values.
    pub fn from_future<F, Fut, E>(producer: F) -> AsyncSignalBuilder<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<AsyncError>,
    {
        AsyncSignalBuilder::new(Box::new(move || {
            stream::once(producer().map(|result| result.map_err(Into::<AsyncError>::into))).boxed()
        }))
    }

    /// Build an async signal from a producer of streams.
    pub fn from_stream<F, S, E>(producer: F) -> AsyncSignalBuilder<T>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
        E: Into<AsyncError>,
    {
        AsyncSignalBuilder::new(Box::new(move || {
            producer()
                .map(|item| item.map_err(Into::<AsyncError>::into))
                .boxed()
        }))
    }

    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    pub fn label(&self) -> Option<Arc<str>> {
        self.inner.node.lock().label().cloned()
    }

    /// The current state, starting the producer if needed.
    ///
    /// Inside a computed or effect this subscribes to later changes.
    ///
    /// # Panics
    ///
    /// Panics if the signal was disposed.
    pub fn value(&self) -> AsyncState<T> {
        match self.try_value() {
            Ok(state) => state,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_value(&self) -> Result<AsyncState<T>> {
        let _graph = reactive::exclusive();
        self.observe()?;
        Ok(self.inner.state.read().clone())
    }

    /// The current state, without subscribing.
    ///
    /// Still counts as a read for lazy start. A disposed signal reports the
    /// state it had when it was disposed.
    pub fn peek(&self) -> AsyncState<T> {
        let _graph = reactive::exclusive();
        if !self.inner.is_disposed() {
            reactive::ensure_fresh(&*self.inner);
            self.inner.ensure_started();
        }
        self.inner.state.read().clone()
    }

    /// Wait until the current attempt settles with a value, a failure or
    /// completion, and return the state at that point.
    ///
    /// If the attempt is superseded while waiting, waits for the newer one.
    pub async fn future(&self) -> Result<AsyncState<T>> {
        self.check_disposed()?;
        reactive::ensure_fresh(&*self.inner);
        self.inner.ensure_started();

        let mut phase = self.inner.phase.subscribe();
        loop {
            let current = *phase.borrow_and_update();
            let latest = self.inner.generation.load(Ordering::SeqCst);
            if current.settled && current.generation == latest {
                tracing::trace!(bridge = %self.id(), generation = latest, "phase settled");
                break;
            }
            if phase.changed().await.is_err() {
                break;
            }
        }
        self.check_disposed()?;
        let state = {
            let _graph = reactive::exclusive();
            self.inner.state.read().clone()
        };
        Ok(state)
    }

    /// Cancel the current attempt and start over from `Loading`.
    pub fn reset(&self) -> Result<()> {
        self.restart(AsyncState::reset)
    }

    /// Start a new attempt, keeping the current value flagged as loading.
    pub fn refresh(&self) -> Result<()> {
        self.restart(AsyncState::refresh)
    }

    /// Start a new attempt from `Loading`, retaining the current payload.
    pub fn reload(&self) -> Result<()> {
        self.restart(AsyncState::reload)
    }

    fn restart(&self, transition: Transition<T>) -> Result<()> {
        self.check_disposed()?;
        if let Some(computed) = ReactiveContext::current_computed() {
            return Err(ReactiveError::WriteInComputed {
                signal: self.id(),
                computed,
            });
        }
        self.inner.restart(transition, true);
        Ok(())
    }

    /// Number of producer attempts and cancellations so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Whether a producer attempt is running or finished and not cancelled.
    pub fn is_active(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Cancel the producer and detach from the graph for good.
    ///
    /// Readers are not notified; they fail on their next read.
    pub fn dispose(&self) {
        let _graph = reactive::exclusive();
        let id = {
            let mut node = self.inner.node.lock();
            if node.is_disposed() {
                return;
            }
            node.set_disposed();
            node.id()
        };
        self.inner.started.store(false, Ordering::SeqCst);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.cancel_task();
        reactive::detach(id, &*self.inner);
        self.inner.phase.send_replace(Phase {
            generation,
            settled: true,
        });
        tracing::debug!(bridge = %id, "disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Number of computeds and effects reading this signal.
    pub fn subscriber_count(&self) -> usize {
        self.inner.node.lock().dependent_count()
    }

    /// Call `f` with the current state now and after every change.
    ///
    /// # Panics
    ///
    /// Like [`value`](Self::value), panics if the signal is disposed when
    /// the callback is due.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&AsyncState<T>) + Send + Sync + 'static,
    {
        let signal = self.clone();
        Subscription::new(Effect::new(move || f(&signal.value())))
    }

    fn check_disposed(&self) -> Result<()> {
        if self.inner.is_disposed() {
            return Err(ReactiveError::Disposed {
                id: self.id(),
                kind: NodeKind::AsyncBridge,
            });
        }
        Ok(())
    }

    /// Bring the signal up to date, start it, and record the read.
    fn observe(&self) -> Result<()> {
        self.check_disposed()?;
        reactive::ensure_fresh(&*self.inner);
        self.inner.ensure_started();

        if ReactiveContext::is_active() {
            let (id, version) = {
                let node = self.inner.node.lock();
                (node.id(), node.version())
            };
            ReactiveContext::track(Edge::new(id, self.inner.clone(), version));
        }
        Ok(())
    }
}

impl<T> Trackable for AsyncSignal<T>
where
    T: Clone + Send + Sync + 'static,
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

impl<T> Clone for AsyncSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for AsyncSignal<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSignal")
            .field("id", &self.id())
            .field("state", &*self.inner.state.read())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Configures an [`AsyncSignal`] before it is built.
#[must_use = "call .build() to create the signal"]
pub struct AsyncSignalBuilder<T> {
    producer: Producer<T>,
    initial: Option<T>,
    dependencies: Vec<Box<dyn Trackable>>,
    options: AsyncOptions,
}

impl<T> AsyncSignalBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(producer: Producer<T>) -> Self {
        Self {
            producer,
            initial: None,
            dependencies: Vec::new(),
            options: AsyncOptions::default(),
        }
    }

    /// Start in `Data` with this value instead of `Loading`.
    pub fn initial(mut self, value: T) -> Self {
        self.initial = Some(value);
        self
    }

    /// Reset the signal whenever `source` changes.
    pub fn dependency(mut self, source: impl Trackable + 'static) -> Self {
        self.dependencies.push(Box::new(source));
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.options.lazy = lazy;
        self
    }

    pub fn auto_dispose(mut self, auto_dispose: bool) -> Self {
        self.options.auto_dispose = auto_dispose;
        self
    }

    pub fn cancel_on_error(mut self, cancel_on_error: bool) -> Self {
        self.options.cancel_on_error = cancel_on_error;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.options.label = Some(label.into());
        self
    }

    /// Replace every option at once.
    pub fn options(mut self, options: AsyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Create the signal.
    ///
    /// Fails with [`ReactiveError::NoRuntime`] outside a tokio runtime.
    pub fn build(self) -> Result<AsyncSignal<T>> {
        let runtime = Handle::try_current().map_err(|_| ReactiveError::NoRuntime)?;

        let label = self.options.label.as_deref().map(Arc::<str>::from);
        let node = Node::new(NodeKind::AsyncBridge, label);
        let state = match self.initial {
            Some(value) => AsyncState::data(value),
            None => AsyncState::loading(),
        };
        let (phase, _) = watch::channel(Phase {
            generation: 0,
            settled: false,
        });
        let lazy = self.options.lazy;

        let inner = Arc::new_cyclic(|weak_self| BridgeInner {
            node: Mutex::new(node),
            state: RwLock::new(state),
            producer: self.producer,
            dependencies: self.dependencies,
            options: self.options,
            generation: AtomicU64::new(0),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
            phase,
            runtime,
            weak_self: weak_self.clone(),
        });
        inner.track_dependencies();
        tracing::debug!(bridge = %inner.id(), lazy, "async signal created");

        if !lazy {
            inner.ensure_started();
        }
        Ok(AsyncSignal { inner })
    }
}
