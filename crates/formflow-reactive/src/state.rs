#![forbid(unsafe_code)]

//! Single-slot reactive cell with synchronous replay on subscribe.
//!
//! # Design
//!
//! [`State<T>`] wraps an optional value of type `T` in shared,
//! reference-counted storage (`Rc<RefCell<..>>`). Every `set_value` stores the
//! value, bumps the version and notifies all live subscribers in registration
//! order. There is no equality check: writing the same value twice notifies
//! twice. Callers that want change detection compare before writing.
//!
//! # Re-entrancy
//!
//! A subscriber may call `set_value` on the same cell while it is being
//! notified. The new value is stored immediately (so `value()` sees it) and
//! its notification is queued behind the current round. Writes to *other*
//! cells proceed synchronously.
//!
//! # Disposal
//!
//! `dispose()` drops every subscriber. Afterwards `set_value` is ignored,
//! `subscribe` returns an inert guard without replaying, and reads keep
//! returning the last stored value.
//!
//! # Performance
//!
//! | Operation     | Complexity                 |
//! |---------------|----------------------------|
//! | `value()`     | O(1) + clone               |
//! | `set_value()` | O(S) where S = subscribers |
//! | `subscribe()` | O(1) amortized             |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::observable::{ObservableEvent, ObservableValue};
use crate::subscription::Subscription;

/// A subscriber callback stored as a strong `Rc` inside its [`Subscription`],
/// handed out as `Weak` to the cell.
type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

/// Reading a cell that has not received a value yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cell has no value yet")]
pub struct EmptyValueError;

/// Shared interior for [`State<T>`].
struct StateInner<T> {
    value: Option<T>,
    version: u64,
    /// Subscribers stored as weak references. Dead entries are pruned on notify.
    subscribers: Vec<CallbackWeak<T>>,
    /// Writes waiting for the current notification round to finish.
    queue: VecDeque<T>,
    notifying: bool,
    disposed: bool,
}

/// A shared, possibly empty value with change notification.
///
/// Cloning a `State` creates a new handle to the **same** cell.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each accepted `set_value`.
/// 2. A subscriber registered while the cell has a value receives it
///    synchronously, before `subscribe` returns.
/// 3. Subscribers are notified in registration order.
/// 4. A disposed cell never calls a subscriber.
pub struct State<T> {
    inner: Rc<RefCell<StateInner<T>>>,
}

/// Weak handle used by emitters that must not keep a cell alive.
pub(crate) struct WeakState<T> {
    inner: Weak<RefCell<StateInner<T>>>,
}

impl<T> Clone for WeakState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> WeakState<T> {
    pub(crate) fn upgrade(&self) -> Option<State<T>> {
        self.inner.upgrade().map(|inner| State { inner })
    }
}

// Manual Clone: shares the same Rc.
impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("State")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

impl<T: Clone + 'static> Default for State<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Clears the notifying flag even if a subscriber panics.
struct NotifyGuard<'a, T> {
    inner: &'a RefCell<StateInner<T>>,
}

impl<T> Drop for NotifyGuard<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.notifying = false;
            inner.queue.clear();
        }
    }
}

impl<T: Clone + 'static> State<T> {
    /// Create a cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_option(Some(value))
    }

    /// Create a cell with no value. `has_value()` is false until the first
    /// `set_value`.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_option(None)
    }

    fn from_option(value: Option<T>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StateInner {
                value,
                version: 0,
                subscribers: Vec::new(),
                queue: VecDeque::new(),
                notifying: false,
                disposed: false,
            })),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakState<T> {
        WeakState {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether a value has been stored.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.inner.borrow().value.is_some()
    }

    /// A clone of the current value.
    pub fn value(&self) -> Result<T, EmptyValueError> {
        self.inner.borrow().value.clone().ok_or(EmptyValueError)
    }

    /// A clone of the current value, or `None` while empty.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// The closure must not write to this cell.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.inner.borrow().value.as_ref())
    }

    /// Store `value` and notify every live subscriber.
    ///
    /// Ignored after [`dispose`](Self::dispose).
    pub fn set_value(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                #[cfg(feature = "tracing")]
                tracing::trace!("write to disposed cell ignored");
                return;
            }
            inner.value = Some(value.clone());
            inner.version += 1;
            inner.queue.push_back(value);
            if inner.notifying {
                return;
            }
            inner.notifying = true;
        }
        self.drain();
    }

    /// Modify the value in place and notify. Does nothing while empty.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let Some(mut value) = self.try_get() else {
            return;
        };
        f(&mut value);
        self.set_value(value);
    }

    /// Drop the stored value without notifying anyone.
    ///
    /// Subscribers stay registered and hear about the next `set_value`.
    pub fn clear(&self) {
        self.inner.borrow_mut().value = None;
    }

    /// Register `callback`. If the cell holds a value, `callback` runs with it
    /// before this method returns.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        let current = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return Subscription::empty();
            }
            inner.subscribers.push(Rc::downgrade(&strong));
            inner.value.clone()
        };
        if let Some(value) = current {
            strong(&value);
        }
        Subscription::holding(strong)
    }

    /// Register `callback` for future writes only, skipping the replay.
    pub fn subscribe_changes(&self, callback: impl Fn(&T) + 'static) -> Subscription {
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

    /// Drop every subscriber and refuse further writes.
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.disposed = true;
        inner.subscribers.clear();
        inner.queue.clear();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Current version number. Increments by 1 on each accepted write.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered subscribers (including dead ones not yet pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Whether both handles point at the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Deliver queued writes until the queue is empty.
    fn drain(&self) {
        let _guard = NotifyGuard { inner: &self.inner };
        loop {
            let (value, callbacks) = {
                let mut inner = self.inner.borrow_mut();
                let Some(value) = inner.queue.pop_front() else {
                    return;
                };
                inner.subscribers.retain(|w| w.strong_count() > 0);
                (value, inner.subscribers.clone())
            };

            for weak in &callbacks {
                if self.inner.borrow().disposed {
                    return;
                }
                // Upgrade lazily: a subscriber dropped earlier in this round
                // must not be called.
                if let Some(cb) = weak.upgrade() {
                    cb(&value);
                }
            }
        }
    }
}

impl<T: Clone + 'static> ObservableEvent<T> for State<T> {
    fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        State::subscribe(self, callback)
    }
}

impl<T: Clone + 'static> ObservableValue<T> for State<T> {
    fn has_value(&self) -> bool {
        State::has_value(self)
    }

    fn value(&self) -> Result<T, EmptyValueError> {
        State::value(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
