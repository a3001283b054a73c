//! Async Bridge
//!
//! Adapts futures and streams into the synchronous reactive graph.
//!
//! # Concepts
//!
//! ## AsyncState
//!
//! [`AsyncState`] is the tri-state value an async signal holds: `Loading`,
//! `Data` or `Error`. Its transitions are plain functions on values and can
//! be used without any runtime.
//!
//! ## AsyncSignal
//!
//! [`AsyncSignal`] owns at most one running attempt of its producer. Reads
//! are synchronous and return the current state; [`AsyncSignal::future`]
//! waits for the current attempt to settle. `reset`, `refresh` and `reload`
//! start a new attempt, and anything the previous attempt produces after
//! that is ignored.
//!
//! Producer failures are values, not panics: they end up in
//! [`AsyncState::Error`] and never interrupt propagation.

mod error;
mod options;
mod signal;
mod state;

pub use error::AsyncError;
pub use options::AsyncOptions;
pub use signal::{AsyncSignal, AsyncSignalBuilder};
pub use state::{AsyncState, Retained};
