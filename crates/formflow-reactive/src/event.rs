#![forbid(unsafe_code)]

//! Fire-only event channel.
//!
//! An [`EventChannel<T>`] has no current value: subscribers only hear
//! emissions made after they subscribed. It is the building block for
//! out-of-band signals such as manually injected field errors.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::observable::ObservableEvent;
use crate::subscription::Subscription;

type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

struct ChannelInner<T> {
    subscribers: Vec<CallbackWeak<T>>,
    disposed: bool,
}

/// A shared stream of values with no memory.
///
/// Cloning an `EventChannel` creates a new handle to the **same** channel.
pub struct EventChannel<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventChannel")
            .field("subscriber_count", &inner.subscribers.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

impl<T: 'static> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EventChannel<T> {
    /// Create a channel with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChannelInner {
                subscribers: Vec::new(),
                disposed: false,
            })),
        }
    }

    /// Deliver `value` to every current subscriber, in registration order.
    pub fn emit(&self, value: T) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner.subscribers.clone()
        };
        for weak in &callbacks {
            if self.inner.borrow().disposed {
                return;
            }
            if let Some(cb) = weak.upgrade() {
                cb(&value);
            }
        }
    }

    /// Register `callback` for future emissions.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return Subscription::empty();
            }
            inner.subscribers.push(Rc::downgrade(&strong));
        }
        Subscription::holding(strong)
    }

    /// Drop every subscriber; later emissions are ignored.
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.disposed = true;
        inner.subscribers.clear();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Whether both handles point at the same channel.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> ObservableEvent<T> for EventChannel<T> {
    fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        EventChannel::subscribe(self, callback)
    }
}
