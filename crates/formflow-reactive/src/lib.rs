#![forbid(unsafe_code)]

//! Reactive cells for formflow.
//!
//! This crate provides the push-based primitives the form engine is built on:
//!
//! - [`State`]: A shared single-slot cell that may start empty. New
//!   subscribers receive the current value synchronously.
//! - [`DerivedState`]: A cell whose value is pushed by a setup function that
//!   may itself subscribe to other cells.
//! - [`EventChannel`]: A fire-only stream with no current value.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`operators`]: `map`, `filter`, `combine`, `switch_map` and friends, each
//!   a thin wrapper around [`DerivedState`].
//!
//! # Architecture
//!
//! Every cell is an `Rc<RefCell<..>>` handle for single-threaded shared
//! ownership. Subscribers are stored as `Weak` callbacks; the strong side
//! lives in the returned [`Subscription`]. No interior borrow is held while
//! a callback runs, so callbacks may freely read and write other cells.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. Subscribing to a cell that holds a value replays that value before
//!    `subscribe` returns.
//! 3. A write issued while the same cell is notifying is queued and delivered
//!    after the current round, so every subscriber sees writes in order.
//! 4. Dropping a [`Subscription`] stops its callback before the next call,
//!    even mid-notification.
//! 5. After `dispose()`, a cell never invokes a subscriber again.

pub mod derived;
pub mod event;
pub mod observable;
pub mod operators;
pub mod state;
pub mod subscription;

pub use derived::{DerivedState, Next};
pub use event::EventChannel;
pub use observable::{ObservableEvent, ObservableValue};
pub use state::{EmptyValueError, State};
pub use subscription::Subscription;
