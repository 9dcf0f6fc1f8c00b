#![forbid(unsafe_code)]

//! Live views across many fields.
//!
//! Each view is a [`DerivedState`] that follows
//! [`FormRegistry::registered_keys`]: registering or unregistering a field
//! re-wires it. Views hold the registry weakly; once the registry is gone
//! they stop updating.

use std::collections::{BTreeMap, BTreeSet};

use formflow_path::{KeySelector, Path, resolve_path, resolve_paths, unflatten};
use formflow_reactive::operators::{
    combine, combine_keyed, distinct_until_changed, just, map, switch_map,
};
use formflow_reactive::{DerivedState, State, Subscription};
use serde_json::Value;
use tracing::error;

use crate::commands::has_ancestor_in;
use crate::control::ControlState;
use crate::error::Result;
use crate::outcome::{ErrorResult, Validity};
use crate::registry::FormRegistry;

/// Which fields a view covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyScope {
    /// Every registered field.
    #[default]
    All,
    /// Only these paths, as they register.
    Keys(Vec<Path>),
}

impl KeyScope {
    /// Scope over the given selectors.
    pub fn keys<I, S>(selectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<KeySelector>,
    {
        Ok(Self::Keys(resolve_paths(selectors)?))
    }

    fn select(&self, registered: &BTreeSet<Path>) -> Vec<Path> {
        match self {
            Self::All => registered.iter().cloned().collect(),
            Self::Keys(keys) => keys
                .iter()
                .filter(|key| registered.contains(*key))
                .cloned()
                .collect(),
        }
    }
}

/// Which errors an error view reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorFilter {
    #[default]
    All,
    /// Hide errors of fields that have not been touched.
    TouchedOnly,
}

fn field_error(control: &State<ControlState>, filter: ErrorFilter) -> DerivedState<ErrorResult> {
    switch_map(control, move |state: &ControlState| {
        if filter == ErrorFilter::TouchedOnly && !state.touched {
            map(&just(ErrorResult::Valid), ErrorResult::clone)
        } else {
            state.error.clone()
        }
    })
}

impl FormRegistry {
    /// Errors of the fields in `scope`, keyed by path. Fields without an
    /// error are left out.
    pub fn errors(
        &self,
        scope: KeyScope,
        filter: ErrorFilter,
    ) -> DerivedState<BTreeMap<Path, ErrorResult>> {
        let registry = self.downgrade();
        let per_field = switch_map(&self.registered_keys(), move |keys: &BTreeSet<Path>| {
            let mut streams = BTreeMap::new();
            if let Some(inner) = registry.upgrade() {
                for key in scope.select(keys) {
                    if let Some(control) = inner.control(&key) {
                        streams.insert(key, field_error(&control, filter));
                    }
                }
            }
            combine_keyed(&streams)
        });
        map(&per_field, |errors: &BTreeMap<Path, ErrorResult>| {
            errors
                .iter()
                .filter(|(_, error)| !error.is_valid())
                .map(|(key, error)| (key.clone(), error.clone()))
                .collect()
        })
    }

    /// Validity of the fields in `scope`, whether touched or not.
    pub fn validity(&self, scope: KeyScope) -> DerivedState<Validity> {
        let errors = self.errors(scope, ErrorFilter::All);
        let validity = map(&errors, |errors: &BTreeMap<Path, ErrorResult>| {
            Validity::reduce(errors.values())
        });
        distinct_until_changed(&validity)
    }

    /// `true` while every registered field holds its initial value.
    pub fn pristine(&self) -> DerivedState<bool> {
        let registry = self.downgrade();
        let all = switch_map(&self.registered_keys(), move |keys: &BTreeSet<Path>| {
            let mut fields = Vec::with_capacity(keys.len());
            if let Some(inner) = registry.upgrade() {
                for key in keys {
                    let pair = combine(&[inner.value_cell(key), inner.initial_cell(key)]);
                    fields.push(map(&pair, |pair: &Vec<Value>| match pair.as_slice() {
                        [value, initial] => value == initial,
                        _ => false,
                    }));
                }
            }
            combine(&fields)
        });
        let pristine = map(&all, |fields: &Vec<bool>| fields.iter().all(|p| *p));
        distinct_until_changed(&pristine)
    }

    /// Value cell of `key`. Unregistered paths get an empty placeholder that
    /// fills once the field registers.
    pub fn watch(&self, key: impl Into<KeySelector>) -> Result<State<Value>> {
        let key = resolve_path(key)?;
        Ok(self.value_cell(&key))
    }

    /// The form tree built from the registered fields' values.
    pub fn form_value(&self) -> DerivedState<Value> {
        let registry = self.downgrade();
        let values = switch_map(&self.registered_keys(), move |keys: &BTreeSet<Path>| {
            let mut cells = BTreeMap::new();
            if let Some(inner) = registry.upgrade() {
                for key in keys {
                    cells.insert(key.clone(), inner.value_cell(key));
                }
            }
            combine_keyed(&cells)
        });
        let tree = map(&values, |values: &BTreeMap<Path, Value>| {
            let visible = values
                .iter()
                .filter(|(path, _)| !has_ancestor_in(path, values));
            unflatten(visible).unwrap_or_else(|err| {
                error!(error = %err, "registered paths do not form a tree");
                Value::Null
            })
        });
        distinct_until_changed(&tree)
    }

    /// Call `on_change(value, is_initial)` with the current value of `key`
    /// and on every later write. `is_initial` is true only for the first
    /// call.
    pub fn on_field_change(
        &self,
        key: impl Into<KeySelector>,
        on_change: impl Fn(&Value, bool) + 'static,
    ) -> Result<Subscription> {
        let cell = self.watch(key)?;
        let first = std::cell::Cell::new(true);
        Ok(cell.subscribe(move |value: &Value| {
            on_change(value, first.replace(false));
        }))
    }
}
