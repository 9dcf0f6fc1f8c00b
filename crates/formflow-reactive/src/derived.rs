#![forbid(unsafe_code)]

//! Push-based derived cells.
//!
//! # Design
//!
//! A [`DerivedState<T>`] is built from a setup function that receives a
//! [`Next<T>`] emitter. The setup runs immediately, may emit any number of
//! times synchronously, and usually subscribes to other cells so it can emit
//! again whenever they fire. It returns a [`Subscription`] that acts as its
//! teardown.
//!
//! # Invariants
//!
//! 1. `has_value()` becomes true after the first emission and stays true.
//! 2. The teardown runs exactly once: on `dispose()` or when the last handle
//!    (including handles kept alive by downstream subscriptions) is dropped.
//! 3. Subscribing to a derived cell keeps its upstream pipeline alive for as
//!    long as that subscription lives.
//!
//! # Failure Modes
//!
//! - **Emit after teardown**: `Next::emit` on a dropped or disposed cell is a
//!   no-op.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::observable::{ObservableEvent, ObservableValue};
use crate::state::{EmptyValueError, State, WeakState};
use crate::subscription::Subscription;

/// Emitter handed to a [`DerivedState`] setup function.
///
/// Holds the target cell weakly, so capturing it in upstream callbacks never
/// keeps the derived cell alive.
pub struct Next<T> {
    target: WeakState<T>,
}

impl<T> Clone for Next<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<T> fmt::Debug for Next<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Next<T> {
    /// Push `value` into the derived cell.
    pub fn emit(&self, value: T) {
        if let Some(state) = self.target.upgrade() {
            state.set_value(value);
        }
    }
}

/// Shared teardown slot. Dropping the last `Rc` releases the setup's
/// subscriptions.
type Teardown = Rc<RefCell<Option<Subscription>>>;

/// A cell whose value is pushed by its setup function.
///
/// Cloning a `DerivedState` creates a new handle to the **same** cell.
pub struct DerivedState<T> {
    state: State<T>,
    teardown: Teardown,
}

impl<T> Clone for DerivedState<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            teardown: Rc::clone(&self.teardown),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DerivedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedState")
            .field("state", &self.state)
            .field("active", &self.teardown.borrow().is_some())
            .finish()
    }
}

impl<T: Clone + 'static> DerivedState<T> {
    /// Run `setup` now and keep its returned teardown until disposal.
    pub fn new(setup: impl FnOnce(Next<T>) -> Subscription) -> Self {
        let state = State::empty();
        let teardown = setup(Next {
            target: state.downgrade(),
        });
        Self {
            state,
            teardown: Rc::new(RefCell::new(Some(teardown))),
        }
    }

    /// Whether the setup has emitted at least once.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.state.has_value()
    }

    /// A clone of the latest emitted value.
    pub fn value(&self) -> Result<T, EmptyValueError> {
        self.state.value()
    }

    /// A clone of the latest emitted value, or `None`.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.state.try_get()
    }

    /// Register `callback`, replaying the latest value if there is one.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.state
            .subscribe(callback)
            .keep_alive((self.state.clone(), Rc::clone(&self.teardown)))
    }

    /// Register `callback` for future emissions only.
    pub fn subscribe_changes(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.state
            .subscribe_changes(callback)
            .keep_alive((self.state.clone(), Rc::clone(&self.teardown)))
    }

    /// Run the teardown and stop emitting. Idempotent.
    pub fn dispose(&self) {
        let teardown = self.teardown.borrow_mut().take();
        drop(teardown);
        self.state.dispose();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    /// Number of emissions so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.version()
    }

    /// Whether both handles point at the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.state.ptr_eq(&other.state)
    }
}

impl<T: Clone + 'static> ObservableEvent<T> for DerivedState<T> {
    fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        DerivedState::subscribe(self, callback)
    }
}

impl<T: Clone + 'static> ObservableValue<T> for DerivedState<T> {
    fn has_value(&self) -> bool {
        DerivedState::has_value(self)
    }

    fn value(&self) -> Result<T, EmptyValueError> {
        DerivedState::value(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
