//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple reactive state engine.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects) with automatic
//!   dependency tracking
//! - Glitch-free, batched change propagation
//! - An async bridge that turns futures and streams into reactive
//!   loading/data/error state
//! - An observer hook for logging and devtools
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Node bookkeeping and update scheduling
//! - `bridge`: Async state machine and the future/stream adapter
//! - `observer`: Lifecycle event hook
//! - `error`: Misuse errors
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use ripple_core::reactive::{batch, Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = Computed::new(move || source.get() * 2);
//!
//! // Create an effect
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let (reader, sink) = (doubled.clone(), log.clone());
//! let _effect = Effect::new(move || sink.lock().push(reader.get()));
//!
//! // Update the signal; the effect runs once per batch
//! batch(|| {
//!     count.set(5);
//!     count.set(6);
//! });
//! assert_eq!(*log.lock(), vec![0, 12]);
//! ```

pub mod bridge;
pub mod error;
pub mod graph;
pub mod observer;
pub mod reactive;

pub use bridge::{AsyncError, AsyncSignal, AsyncState};
pub use error::{ReactiveError, Result};
pub use reactive::{batch, untracked, Computed, Effect, Signal, Subscription};
