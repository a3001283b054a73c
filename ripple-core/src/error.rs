//! Error types for misuse of the reactive graph.
//!
//! Producer failures are not errors in this sense: they are data, carried
//! by [`AsyncState::Error`](crate::bridge::AsyncState::Error).

use thiserror::Error;

use crate::graph::{NodeId, NodeKind};

/// Errors raised when the graph is used in a way it cannot honor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// The node was disposed and can no longer be read or restarted.
    #[error("{kind} {id} has been disposed")]
    Disposed { id: NodeId, kind: NodeKind },

    /// A computed read its own value while evaluating.
    #[error("cycle detected: computed {id} read itself during evaluation")]
    Cycle { id: NodeId },

    /// A signal was written from inside a computed derivation.
    #[error("signal {signal} written while evaluating computed {computed}; derivations must be pure")]
    WriteInComputed { signal: NodeId, computed: NodeId },

    /// A batch was opened from inside a computed derivation.
    #[error("batch opened while evaluating computed {computed}")]
    BatchInComputed { computed: NodeId },

    /// An async signal needs a tokio runtime to drive its producer.
    #[error("no tokio runtime is available to drive the async producer")]
    NoRuntime,

    /// Effects kept invalidating each other.
    #[error("propagation did not settle after {passes} passes")]
    FlushLimit { passes: usize },
}

/// Result type for reactive operations.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_node() {
        let err = ReactiveError::Disposed {
            id: NodeId::from(3),
            kind: NodeKind::Computed,
        };
        assert_eq!(err.to_string(), "computed #3 has been disposed");

        let err = ReactiveError::WriteInComputed {
            signal: NodeId::from(1),
            computed: NodeId::from(2),
        };
        assert!(err.to_string().starts_with("signal #1 written"));
    }
}
