//! Observer Hook
//!
//! A side channel that receives creation and update events from signals and
//! computeds, for logging or devtools. It never affects control flow.
//!
//! There is one process-wide slot, empty by default. When nothing is
//! installed the graph skips the calls entirely. Test harnesses can install
//! an observer for the current thread only with [`with_observer`], which
//! takes precedence over the global slot.
//!
//! Observer code runs synchronously inside the event it reports. It must not
//! write to signals or otherwise mutate the graph; doing so re-enters the
//! propagation it is observing. This is the caller's responsibility and is
//! not checked.

use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::graph::NodeId;

/// Receives lifecycle events from the graph.
///
/// Every method has an empty default, so implementations only override
/// what they care about. Update callbacks receive the new value as `&dyn Any`;
/// downcast it to the concrete type you expect.
pub trait Observer: Send + Sync {
    fn on_signal_created(&self, _id: NodeId, _label: Option<&str>) {}

    fn on_signal_updated(&self, _id: NodeId, _label: Option<&str>, _value: &dyn Any) {}

    fn on_computed_created(&self, _id: NodeId, _label: Option<&str>) {}

    fn on_computed_updated(&self, _id: NodeId, _label: Option<&str>, _value: &dyn Any) {}
}

/// Reports every event as a `tracing` event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_signal_created(&self, id: NodeId, label: Option<&str>) {
        tracing::debug!(signal = %id, label = label.unwrap_or_default(), "signal created");
    }

    fn on_signal_updated(&self, id: NodeId, label: Option<&str>, _value: &dyn Any) {
        tracing::debug!(signal = %id, label = label.unwrap_or_default(), "signal updated");
    }

    fn on_computed_created(&self, id: NodeId, label: Option<&str>) {
        tracing::debug!(computed = %id, label = label.unwrap_or_default(), "computed created");
    }

    fn on_computed_updated(&self, id: NodeId, label: Option<&str>, _value: &dyn Any) {
        tracing::debug!(computed = %id, label = label.unwrap_or_default(), "computed updated");
    }
}

static INSTALLED: AtomicBool = AtomicBool::new(false);
static GLOBAL: RwLock<Option<Arc<dyn Observer>>> = parking_lot::const_rwlock(None);

thread_local! {
    static SCOPED: RefCell<Option<Arc<dyn Observer>>> = const { RefCell::new(None) };
}

/// Install (or clear, with `None`) the process-wide observer.
///
/// Returns the observer that was previously installed.
pub fn set_observer(observer: Option<Arc<dyn Observer>>) -> Option<Arc<dyn Observer>> {
    let mut slot = GLOBAL.write();
    INSTALLED.store(observer.is_some(), Ordering::Release);
    std::mem::replace(&mut *slot, observer)
}

/// Run `f` with `observer` receiving events raised on this thread.
///
/// The previous thread-scoped observer is restored afterwards, also when `f`
/// panics.
pub fn with_observer<R>(observer: Arc<dyn Observer>, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Arc<dyn Observer>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            SCOPED.with(|slot| *slot.borrow_mut() = previous);
        }
    }

    let previous = SCOPED.with(|slot| slot.borrow_mut().replace(observer));
    let _restore = Restore(previous);
    f()
}

fn current() -> Option<Arc<dyn Observer>> {
    if let Some(scoped) = SCOPED.with(|slot| slot.borrow().clone()) {
        return Some(scoped);
    }
    if !INSTALLED.load(Ordering::Acquire) {
        return None;
    }
    GLOBAL.read().clone()
}

fn label_str(label: Option<&Arc<str>>) -> Option<&str> {
    label.map(|label| &**label)
}

pub(crate) fn signal_created(id: NodeId, label: Option<&Arc<str>>) {
    if let Some(observer) = current() {
        observer.on_signal_created(id, label_str(label));
    }
}

pub(crate) fn signal_updated(id: NodeId, label: Option<&Arc<str>>, value: &dyn Any) {
    if let Some(observer) = current() {
        observer.on_signal_updated(id, label_str(label), value);
    }
}

pub(crate) fn computed_created(id: NodeId, label: Option<&Arc<str>>) {
    if let Some(observer) = current() {
        observer.on_computed_created(id, label_str(label));
    }
}

pub(crate) fn computed_updated(id: NodeId, label: Option<&Arc<str>>, value: &dyn Any) {
    if let Some(observer) = current() {
        observer.on_computed_updated(id, label_str(label), value);
    }
}
