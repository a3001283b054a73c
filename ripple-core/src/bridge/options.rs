use serde::{Deserialize, Serialize};

/// How an [`AsyncSignal`](super::AsyncSignal) drives its producer.
///
/// Deserializable, with every field optional:
///
/// ```rust
/// use ripple_core::bridge::AsyncOptions;
///
/// let options: AsyncOptions = serde_json::from_str(r#"{ "auto_dispose": true }"#).unwrap();
/// assert!(options.lazy);
/// assert!(options.auto_dispose);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncOptions {
    /// Wait for the first read before invoking the producer.
    pub lazy: bool,

    /// Cancel the producer when the last subscriber goes away. The next read
    /// starts it again.
    pub auto_dispose: bool,

    /// Stop consuming the producer after its first failure.
    pub cancel_on_error: bool,

    /// Label used in logs.
    pub label: Option<String>,
}

impl Default for AsyncOptions {
    fn default() -> Self {
        Self {
            lazy: true,
            auto_dispose: false,
            cancel_on_error: false,
            label: None,
        }
    }
}
