#![forbid(unsafe_code)]

//! RAII subscription guards.
//!
//! A [`Subscription`] owns whatever keeps a callback registered: usually the
//! strong `Rc` of a callback whose `Weak` side sits in a cell's subscriber
//! list, sometimes a teardown closure or several nested guards. Dropping the
//! guard releases all of it.

use std::any::Any;
use std::fmt;

/// Runs a closure when dropped.
struct OnDrop(Option<Box<dyn FnOnce()>>);

impl Drop for OnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// RAII guard for a subscriber callback or a teardown action.
///
/// Each call to `subscribe` hands out its own guard, so subscribing the same
/// closure twice and dropping one guard leaves the other registration intact.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    /// Type-erased guards released in order on drop.
    guards: Vec<Box<dyn Any>>,
}

impl Subscription {
    /// A guard holding nothing.
    pub fn empty() -> Self {
        Self { guards: Vec::new() }
    }

    /// Keep `guard` alive until this subscription is dropped.
    pub(crate) fn holding(guard: impl Any) -> Self {
        Self {
            guards: vec![Box::new(guard)],
        }
    }

    /// A guard that runs `teardown` once when dropped.
    pub fn from_fn(teardown: impl FnOnce() + 'static) -> Self {
        Self::holding(OnDrop(Some(Box::new(teardown))))
    }

    /// Combine several guards into one.
    pub fn merge(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        let mut guards = Vec::new();
        for sub in subscriptions {
            guards.extend(sub.guards);
        }
        Self { guards }
    }

    /// Additionally keep `handle` alive for as long as this guard lives.
    ///
    /// Derived cells use this so a downstream subscriber keeps its upstream
    /// pipeline running.
    pub fn keep_alive(mut self, handle: impl Any) -> Self {
        self.guards.push(Box::new(handle));
        self
    }

    /// Whether this guard holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Explicitly unsubscribe. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("guards", &self.guards.len())
            .finish()
    }
}
