#![forbid(unsafe_code)]

//! Traits shared by every reactive source.

use crate::state::EmptyValueError;
use crate::subscription::Subscription;

/// A stream of values that can be observed.
pub trait ObservableEvent<T> {
    /// Register `callback` for future emissions.
    ///
    /// Value-holding implementations also replay their current value
    /// synchronously before returning.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription;
}

/// A stream that also remembers its latest value.
pub trait ObservableValue<T>: ObservableEvent<T> {
    /// Whether a value has been emitted yet.
    fn has_value(&self) -> bool;

    /// A clone of the latest value.
    fn value(&self) -> Result<T, EmptyValueError>;
}

impl<T, S: ObservableEvent<T>> ObservableEvent<T> for &S {
    fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        (**self).subscribe(callback)
    }
}
