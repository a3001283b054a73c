//! Subscriber types for the reactive system.
//!
//! A [`Trackable`] is anything a computation can depend on: signals,
//! computeds and async signals. A [`Subscription`] is the handle returned by
//! `subscribe`; it keeps a reader attached to a source until dropped.

use super::Effect;
use crate::graph::NodeId;

/// A reactive source that can be read for its dependency alone.
///
/// Async signals take their declared dependencies as `Trackable`s so that
/// sources of different value types can be listed together.
pub trait Trackable: Send + Sync {
    /// Unique ID of the underlying node.
    fn node_id(&self) -> NodeId;

    /// Register a read with the current tracking context, if any.
    fn track(&self);
}

/// A live subscription to a reactive source.
///
/// Each subscription counts as one subscriber of the source until it is
/// dropped or [`unsubscribe`](Self::unsubscribe)d.
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    effect: Effect,
}

impl Subscription {
    pub(crate) fn new(effect: Effect) -> Self {
        Self { effect }
    }

    /// Unique ID of the effect delivering the callbacks.
    pub fn id(&self) -> NodeId {
        self.effect.id()
    }

    /// Whether the callback will still be called on changes.
    pub fn is_active(&self) -> bool {
        !self.effect.is_disposed()
    }

    /// Stop receiving changes. Same as dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.effect.dispose();
    }
}
