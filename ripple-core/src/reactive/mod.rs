//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Ripple's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only when somebody needs the
//! value. Computeds must be pure: writing a signal or opening a batch from a
//! derivation is rejected.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as a UI layer or a log.
//!
//! ## Batches
//!
//! [`batch`] defers propagation until the outermost batch exits, so an effect
//! that reads several signals written together runs once.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! Propagation is glitch-free: no computed or effect ever observes a mix of
//! pre- and post-write values from the same batch.

mod computed;
mod context;
mod effect;
mod runtime;
mod signal;
mod subscriber;

pub use computed::Computed;
pub use context::ReactiveContext;
pub use effect::Effect;
pub use runtime::{batch, try_batch, untracked, Runtime, RuntimeConfig};
pub use signal::Signal;
pub use subscriber::{Subscription, Trackable};

pub(crate) use runtime::{
    detach, ensure_fresh, exclusive, notify_changed, release, rewire, Reactive, StaleOnUnwind,
};
