//! Producer failures.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A failure reported by an async producer.
///
/// Cheap to clone, so it can live inside [`AsyncState`](super::AsyncState)
/// and be handed to every reader. The original error is kept and can be
/// recovered with [`downcast_ref`](Self::downcast_ref).
///
/// Any `std::error::Error + Send + Sync + 'static` converts into it with `?`
/// or `.into()`.
#[derive(Clone)]
pub struct AsyncError(Arc<dyn Error + Send + Sync + 'static>);

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

impl AsyncError {
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// An error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// The original error, if it has type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: Error + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    pub fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl<E> From<E> for AsyncError
where
    E: Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Two errors are equal when they are clones of the same failure.
impl PartialEq for AsyncError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded: {0}")]
    struct QuotaExceeded(u32);

    #[test]
    fn keeps_the_original_error() {
        let error = AsyncError::from(QuotaExceeded(3));
        assert_eq!(error.to_string(), "quota exceeded: 3");
        assert_eq!(error.downcast_ref::<QuotaExceeded>().map(|e| e.0), Some(3));
        assert!(error.downcast_ref::<std::io::Error>().is_none());
    }

    #[test]
    fn equality_is_identity() {
        let error = AsyncError::msg("offline");
        assert_eq!(error, error.clone());
        assert_ne!(error, AsyncError::msg("offline"));
    }

    #[test]
    fn converts_with_question_mark() {
        fn parse(input: &str) -> Result<i32, AsyncError> {
            Ok(input.parse::<i32>()?)
        }

        let error = parse("x").unwrap_err();
        assert!(error.downcast_ref::<std::num::ParseIntError>().is_some());
    }
}
