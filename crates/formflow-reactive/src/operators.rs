#![forbid(unsafe_code)]

//! Stream operators over [`ObservableEvent`] sources.
//!
//! Every operator returns a [`DerivedState`] whose setup subscribes to its
//! inputs. Subscribing downstream keeps the whole chain alive; dropping the
//! last downstream guard tears it down.
//!
//! All operators are synchronous: an upstream emission propagates to the
//! output before the upstream `set_value` returns.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::derived::DerivedState;
use crate::observable::ObservableEvent;
use crate::state::State;
use crate::subscription::Subscription;

/// Transform every emission with `f`.
pub fn map<T, U, S>(source: &S, f: impl Fn(&T) -> U + 'static) -> DerivedState<U>
where
    S: ObservableEvent<T>,
    T: 'static,
    U: Clone + 'static,
{
    DerivedState::new(|next| source.subscribe(move |value: &T| next.emit(f(value))))
}

/// Forward only the emissions for which `predicate` holds.
pub fn filter<T, S>(source: &S, predicate: impl Fn(&T) -> bool + 'static) -> DerivedState<T>
where
    S: ObservableEvent<T>,
    T: Clone + 'static,
{
    DerivedState::new(|next| {
        source.subscribe(move |value: &T| {
            if predicate(value) {
                next.emit(value.clone());
            }
        })
    })
}

/// Suppress emissions equal to the previous one.
pub fn distinct_until_changed<T, S>(source: &S) -> DerivedState<T>
where
    S: ObservableEvent<T>,
    T: Clone + PartialEq + 'static,
{
    DerivedState::new(|next| {
        let last: RefCell<Option<T>> = RefCell::new(None);
        source.subscribe(move |value: &T| {
            let changed = {
                let mut last = last.borrow_mut();
                if last.as_ref() == Some(value) {
                    false
                } else {
                    *last = Some(value.clone());
                    true
                }
            };
            if changed {
                next.emit(value.clone());
            }
        })
    })
}

/// Emit the vector of latest values once every source has produced one, and
/// again whenever any of them fires afterwards.
///
/// An empty input emits an empty vector immediately.
pub fn combine<T, S>(sources: &[S]) -> DerivedState<Vec<T>>
where
    S: ObservableEvent<T>,
    T: Clone + 'static,
{
    DerivedState::new(|next| {
        if sources.is_empty() {
            next.emit(Vec::new());
            return Subscription::empty();
        }
        let slots: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; sources.len()]));
        let subs: Vec<Subscription> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                let slots = Rc::clone(&slots);
                let next = next.clone();
                source.subscribe(move |value: &T| {
                    let complete = {
                        let mut slots = slots.borrow_mut();
                        slots[index] = Some(value.clone());
                        slots.iter().cloned().collect::<Option<Vec<T>>>()
                    };
                    if let Some(values) = complete {
                        next.emit(values);
                    }
                })
            })
            .collect();
        Subscription::merge(subs)
    })
}

/// Keyed variant of [`combine`].
pub fn combine_keyed<K, T, S>(sources: &BTreeMap<K, S>) -> DerivedState<BTreeMap<K, T>>
where
    K: Ord + Clone + 'static,
    S: ObservableEvent<T>,
    T: Clone + 'static,
{
    let keys: Rc<[K]> = sources.keys().cloned().collect();
    let streams: Vec<&S> = sources.values().collect();
    let combined = combine(&streams);
    map(&combined, move |values: &Vec<T>| {
        keys.iter().cloned().zip(values.iter().cloned()).collect()
    })
}

/// For each emission, subscribe to the stream returned by `f` and forward
/// its values, dropping the subscription to the previous inner stream.
///
/// Values from a superseded inner stream are never forwarded, even if it
/// emits while being replaced.
pub fn switch_map<T, U, S, I>(source: &S, f: impl Fn(&T) -> I + 'static) -> DerivedState<U>
where
    S: ObservableEvent<T>,
    I: ObservableEvent<U>,
    T: 'static,
    U: Clone + 'static,
{
    DerivedState::new(|next| {
        let inner: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let generation = Rc::new(Cell::new(0u64));
        let slot = Rc::clone(&inner);
        let outer = source.subscribe(move |value: &T| {
            let id = generation.get() + 1;
            generation.set(id);
            let previous = slot.borrow_mut().take();
            drop(previous);

            let stream = f(value);
            let next = next.clone();
            let current = Rc::clone(&generation);
            let sub = stream.subscribe(move |item: &U| {
                if current.get() == id {
                    next.emit(item.clone());
                }
            });
            if generation.get() == id {
                *slot.borrow_mut() = Some(sub);
            }
        });
        Subscription::merge([
            outer,
            Subscription::from_fn(move || {
                let last = inner.borrow_mut().take();
                drop(last);
            }),
        ])
    })
}

/// Emit `initial` first, then every emission of `source`.
pub fn with_default<T, S>(source: &S, initial: T) -> DerivedState<T>
where
    S: ObservableEvent<T>,
    T: Clone + 'static,
{
    DerivedState::new(|next| {
        next.emit(initial);
        source.subscribe(move |value: &T| next.emit(value.clone()))
    })
}

/// Forward the first `count` emissions, then detach from `source`.
pub fn take<T, S>(source: &S, count: usize) -> DerivedState<T>
where
    S: ObservableEvent<T>,
    T: Clone + 'static,
{
    DerivedState::new(|next| {
        if count == 0 {
            return Subscription::empty();
        }
        let remaining = Rc::new(Cell::new(count));
        let holder: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let weak_holder = Rc::downgrade(&holder);
        let left = Rc::clone(&remaining);
        let sub = source.subscribe(move |value: &T| {
            let n = left.get();
            if n == 0 {
                return;
            }
            left.set(n - 1);
            next.emit(value.clone());
            if n == 1 {
                if let Some(holder) = weak_holder.upgrade() {
                    let done = holder.borrow_mut().take();
                    drop(done);
                }
            }
        });
        if remaining.get() > 0 {
            *holder.borrow_mut() = Some(sub);
        }
        Subscription::holding(holder)
    })
}

/// Ignore whatever `source` emits while it is being subscribed to (the
/// replay of its current value), forwarding only later emissions.
pub fn skip_synchronous<T, S>(source: &S) -> DerivedState<T>
where
    S: ObservableEvent<T>,
    T: Clone + 'static,
{
    DerivedState::new(|next| {
        let subscribing = Rc::new(Cell::new(true));
        let flag = Rc::clone(&subscribing);
        let sub = source.subscribe(move |value: &T| {
            if !flag.get() {
                next.emit(value.clone());
            }
        });
        subscribing.set(false);
        sub
    })
}

/// Interleave the emissions of several sources.
pub fn merge<T, S>(sources: &[S]) -> DerivedState<T>
where
    S: ObservableEvent<T>,
    T: Clone + 'static,
{
    DerivedState::new(|next| {
        Subscription::merge(sources.iter().map(|source| {
            let next = next.clone();
            source.subscribe(move |value: &T| next.emit(value.clone()))
        }))
    })
}

/// A cell that already holds `value`.
pub fn just<T: Clone + 'static>(value: T) -> State<T> {
    State::new(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventChannel;

    fn record<T: Clone + 'static>(source: &DerivedState<T>) -> (Rc<RefCell<Vec<T>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let sub = source.subscribe(move |v: &T| s.borrow_mut().push(v.clone()));
        (seen, sub)
    }

    #[test]
    fn map_tracks_source() {
        let source = State::new(2);
        let doubled = map(&source, |v: &i32| v * 2);
        assert_eq!(doubled.value(), Ok(4));
        source.set_value(21);
        assert_eq!(doubled.value(), Ok(42));
    }

    #[test]
    fn map_over_empty_source_stays_empty() {
        let source: State<i32> = State::empty();
        let mapped = map(&source, |v: &i32| v + 1);
        assert!(!mapped.has_value());
        source.set_value(1);
        assert_eq!(mapped.value(), Ok(2));
    }

    #[test]
    fn filter_drops_rejected_values() {
        let source = State::new(1);
        let evens = filter(&source, |v: &i32| v % 2 == 0);
        let (seen, _sub) = record(&evens);
        for v in 2..=6 {
            source.set_value(v);
        }
        assert_eq!(*seen.borrow(), vec![2, 4, 6]);
    }

    #[test]
    fn distinct_suppresses_repeats() {
        let source = State::new(1);
        let distinct = distinct_until_changed(&source);
        let (seen, _sub) = record(&distinct);
        for v in [1, 1, 2, 2, 1] {
            source.set_value(v);
        }
        assert_eq!(*seen.borrow(), vec![1, 2, 1]);
    }

    #[test]
    fn combine_waits_for_every_source() {
        let a = State::new(1);
        let b: State<i32> = State::empty();
        let both = combine(&[a.clone(), b.clone()]);
        assert!(!both.has_value());

        b.set_value(2);
        assert_eq!(both.value(), Ok(vec![1, 2]));

        a.set_value(10);
        assert_eq!(both.value(), Ok(vec![10, 2]));
    }

    #[test]
    fn combine_of_ready_sources_emits_once_on_setup() {
        let sources = [State::new(1), State::new(2), State::new(3)];
        let all = combine(&sources);
        assert_eq!(all.version(), 1);
        assert_eq!(all.value(), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn combine_of_nothing_emits_empty() {
        let none: [State<u8>; 0] = [];
        let all = combine(&none);
        assert_eq!(all.value(), Ok(Vec::new()));
    }

    #[test]
    fn combine_keyed_preserves_keys() {
        let mut sources = BTreeMap::new();
        sources.insert("x", State::new(1));
        sources.insert("y", State::new(2));
        let keyed = combine_keyed(&sources);
        let value = keyed.value().expect("ready");
        assert_eq!(value.get("x"), Some(&1));
        assert_eq!(value.get("y"), Some(&2));

        sources["y"].set_value(5);
        assert_eq!(keyed.value().expect("ready").get("y"), Some(&5));
    }

    #[test]
    fn switch_map_follows_latest_inner() {
        let selector = State::new(0usize);
        let inners = [State::new("a0"), State::new("b0")];
        let handles = inners.clone();
        let switched = switch_map(&selector, move |i: &usize| handles[*i].clone());
        let (seen, _sub) = record(&switched);
        assert_eq!(*seen.borrow(), vec!["a0"]);

        selector.set_value(1);
        inners[0].set_value("a1");
        inners[1].set_value("b1");
        assert_eq!(*seen.borrow(), vec!["a0", "b0", "b1"]);
    }

    #[test]
    fn switch_map_releases_inner_on_teardown() {
        let selector = State::new(());
        let inner = State::new(0);
        let handle = inner.clone();
        let switched = switch_map(&selector, move |_: &()| handle.clone());
        assert_eq!(inner.subscriber_count(), 1);
        switched.dispose();
        inner.set_value(1);
        assert_eq!(switched.value(), Ok(0));
    }

    #[test]
    fn with_default_emits_default_then_source() {
        let events = EventChannel::new();
        let status = with_default(&events, "idle");
        let (seen, _sub) = record(&status);
        events.emit("busy");
        assert_eq!(*seen.borrow(), vec!["idle", "busy"]);
    }

    #[test]
    fn take_detaches_after_count() {
        let source = State::new(0);
        let first_two = take(&source, 2);
        let (seen, _sub) = record(&first_two);
        for v in 1..5 {
            source.set_value(v);
        }
        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn take_zero_never_emits() {
        let source = State::new(0);
        let none = take(&source, 0);
        source.set_value(1);
        assert!(!none.has_value());
    }

    #[test]
    fn skip_synchronous_ignores_replay() {
        let source = State::new(1);
        let later = skip_synchronous(&source);
        assert!(!later.has_value());
        source.set_value(2);
        assert_eq!(later.value(), Ok(2));
    }

    #[test]
    fn merge_interleaves() {
        let a = EventChannel::new();
        let b = EventChannel::new();
        let merged = merge(&[a.clone(), b.clone()]);
        let (seen, _sub) = record(&merged);
        a.emit(1);
        b.emit(2);
        a.emit(3);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn just_is_ready() {
        let ready = just("x");
        assert_eq!(ready.value(), Ok("x"));
    }

    #[test]
    fn chain_survives_intermediate_handles_dropping() {
        let source = State::new(1);
        let out = {
            let doubled = map(&source, |v: &i32| v * 2);
            let plus_one = map(&doubled, |v: &i32| v + 1);
            distinct_until_changed(&plus_one)
        };
        source.set_value(5);
        assert_eq!(out.value(), Ok(11));
    }
}
