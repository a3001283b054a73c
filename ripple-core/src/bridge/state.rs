//! The tri-state value of an async signal, and its transitions.
//!
//! Transitions are pure: each one consumes the current state and returns the
//! next. [`AsyncSignal`](super::AsyncSignal) is the only thing that drives
//! them at runtime.
//!
//! `is_loading` means "a fetch is in flight". In `Data` and `Error` it never
//! implies that the payload is unusable.

use super::AsyncError;

/// A payload kept visible while a reload is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum Retained<T> {
    Data(T),
    Error {
        error: AsyncError,
        previous: Option<T>,
    },
}

/// Loading, a value, or a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncState<T> {
    /// Waiting for the producer. `retained` holds the payload a
    /// [`reload`](Self::reload) kept around.
    Loading { retained: Option<Retained<T>> },

    /// The producer's latest value.
    Data { value: T, is_loading: bool },

    /// The producer failed. `previous` is the last good value, if any.
    Error {
        error: AsyncError,
        previous: Option<T>,
        is_loading: bool,
    },
}

impl<T> Default for AsyncState<T> {
    fn default() -> Self {
        Self::loading()
    }
}

impl<T> AsyncState<T> {
    /// `Loading` with nothing retained.
    pub fn loading() -> Self {
        Self::Loading { retained: None }
    }

    pub fn data(value: T) -> Self {
        Self::Data {
            value,
            is_loading: false,
        }
    }

    /// Start over: `Loading`, dropping any payload.
    pub fn reset(self) -> Self {
        Self::loading()
    }

    /// `Loading`, keeping the current `Data`/`Error` payload alongside.
    pub fn reload(self) -> Self {
        match self {
            Self::Data { value, .. } => Self::Loading {
                retained: Some(Retained::Data(value)),
            },
            Self::Error {
                error, previous, ..
            } => Self::Loading {
                retained: Some(Retained::Error { error, previous }),
            },
            loading @ Self::Loading { .. } => loading,
        }
    }

    /// Keep the current variant, flagged as loading.
    pub fn refresh(self) -> Self {
        match self {
            Self::Data { value, .. } => Self::Data {
                value,
                is_loading: true,
            },
            Self::Error {
                error, previous, ..
            } => Self::Error {
                error,
                previous,
                is_loading: true,
            },
            loading @ Self::Loading { .. } => loading,
        }
    }

    /// The producer emitted `value`.
    pub fn emit(self, value: T) -> Self {
        Self::data(value)
    }

    /// The producer failed. The last good value is carried along.
    pub fn fail(self, error: AsyncError) -> Self {
        Self::Error {
            error,
            previous: self.into_last_value(),
            is_loading: false,
        }
    }

    /// The producer finished.
    ///
    /// Clears `is_loading`. A retained payload that nothing replaced becomes
    /// current again; a plain `Loading` stays `Loading`.
    pub fn complete(self) -> Self {
        match self {
            Self::Data { value, .. } => Self::data(value),
            Self::Error {
                error, previous, ..
            } => Self::Error {
                error,
                previous,
                is_loading: false,
            },
            Self::Loading {
                retained: Some(Retained::Data(value)),
            } => Self::data(value),
            Self::Loading {
                retained: Some(Retained::Error { error, previous }),
            } => Self::Error {
                error,
                previous,
                is_loading: false,
            },
            Self::Loading { retained: None } => Self::loading(),
        }
    }

    pub fn is_loading(&self) -> bool {
        match self {
            Self::Loading { .. } => true,
            Self::Data { is_loading, .. } | Self::Error { is_loading, .. } => *is_loading,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The current value, only in `Data`.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Data { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The current failure, only in `Error`.
    pub fn error(&self) -> Option<&AsyncError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The latest good value, wherever it is kept.
    pub fn last_value(&self) -> Option<&T> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Error { previous, .. } => previous.as_ref(),
            Self::Loading { retained } => match retained {
                Some(Retained::Data(value)) => Some(value),
                Some(Retained::Error { previous, .. }) => previous.as_ref(),
                None => None,
            },
        }
    }

    fn into_last_value(self) -> Option<T> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Error { previous, .. } => previous,
            Self::Loading { retained } => match retained {
                Some(Retained::Data(value)) => Some(value),
                Some(Retained::Error { previous, .. }) => previous,
                None => None,
            },
        }
    }

    /// Map every value the state holds, keeping its shape.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> AsyncState<U> {
        match self {
            Self::Loading { retained } => AsyncState::Loading {
                retained: retained.map(|retained| match retained {
                    Retained::Data(value) => Retained::Data(f(value)),
                    Retained::Error { error, previous } => Retained::Error {
                        error,
                        previous: previous.map(&mut f),
                    },
                }),
            },
            Self::Data { value, is_loading } => AsyncState::Data {
                value: f(value),
                is_loading,
            },
            Self::Error {
                error,
                previous,
                is_loading,
            } => AsyncState::Error {
                error,
                previous: previous.map(f),
                is_loading,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_discards_payload() {
        let state = AsyncState::data(1).reset();
        assert_eq!(state, AsyncState::loading());
        assert!(state.last_value().is_none());
    }

    #[test]
    fn reload_retains_payload() {
        let state = AsyncState::data(1).reload();
        assert!(state.is_loading());
        assert!(!state.is_data());
        assert_eq!(state.last_value(), Some(&1));

        let error = AsyncError::msg("down");
        let state = AsyncState::data(1).fail(error.clone()).reload();
        assert_eq!(
            state,
            AsyncState::Loading {
                retained: Some(Retained::Error {
                    error,
                    previous: Some(1)
                })
            }
        );
    }

    #[test]
    fn refresh_keeps_variant() {
        let state = AsyncState::data("a").refresh();
        assert_eq!(
            state,
            AsyncState::Data {
                value: "a",
                is_loading: true
            }
        );

        let state = AsyncState::<i32>::loading().fail(AsyncError::msg("x")).refresh();
        assert!(state.is_error());
        assert!(state.is_loading());
    }

    #[test]
    fn fail_keeps_previous_data() {
        let error = AsyncError::msg("timeout");
        let state = AsyncState::data(7).refresh().fail(error.clone());
        assert_eq!(
            state,
            AsyncState::Error {
                error: error.clone(),
                previous: Some(7),
                is_loading: false
            }
        );

        // A second failure still remembers the last good value.
        let state = state.fail(AsyncError::msg("again"));
        assert_eq!(state.last_value(), Some(&7));
    }

    #[test]
    fn emit_replaces_anything() {
        let state = AsyncState::data(1).reload().emit(2);
        assert_eq!(state, AsyncState::data(2));
    }

    #[test]
    fn complete_clears_loading_flag() {
        let state = AsyncState::data(3).refresh().complete();
        assert_eq!(state, AsyncState::data(3));
    }

    #[test]
    fn complete_restores_retained_payload() {
        let state = AsyncState::data(3).reload().complete();
        assert_eq!(state, AsyncState::data(3));

        let plain = AsyncState::<i32>::loading().complete();
        assert_eq!(plain, AsyncState::loading());
    }

    #[test]
    fn map_preserves_shape() {
        let state = AsyncState::data(2).reload().map(|v| v * 10);
        assert_eq!(state.last_value(), Some(&20));
        assert!(state.is_loading());
    }

    #[test]
    fn accessors() {
        let error = AsyncError::msg("nope");
        let state = AsyncState::<i32>::loading().fail(error.clone());
        assert_eq!(state.error(), Some(&error));
        assert!(state.value().is_none());
        assert!(!state.is_loading());
        assert_eq!(AsyncState::data(1).value(), Some(&1));
    }
}
