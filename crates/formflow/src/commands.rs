#![forbid(unsafe_code)]

//! One-shot commands against a [`FormRegistry`].
//!
//! Commands read or write the current state without subscribing. Commands
//! addressed at a field that is not registered log a warning and do
//! nothing; only a malformed selector is returned as an error.

use std::collections::BTreeMap;

use formflow_path::{KeySelector, Path, flatten, get_in, resolve_path, unflatten};
use formflow_reactive::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{FormError, Result};
use crate::outcome::{ErrorResult, Validity};
use crate::registry::FormRegistry;

/// A registered field whose value differs from its initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub key: Path,
    pub initial: Value,
    pub value: Value,
}

fn registered_key(
    registry: &FormRegistry,
    key: impl Into<KeySelector>,
    action: &'static str,
) -> Result<Option<Path>> {
    let path = resolve_path(key)?;
    if registry.is_registered(&path) {
        Ok(Some(path))
    } else {
        warn!(path = %path, action, "field not registered, command ignored");
        Ok(None)
    }
}

/// Whether some strict ancestor of `path` is a key of `entries`.
pub(crate) fn has_ancestor_in<V>(path: &Path, entries: &BTreeMap<Path, V>) -> bool {
    let raw = path.as_str();
    raw.match_indices(['.', '['])
        .any(|(at, _)| at > 0 && entries.contains_key(&raw[..at]))
}

fn build_tree(cells: Vec<(Path, State<Value>)>) -> Value {
    let stored: BTreeMap<Path, Value> = cells
        .into_iter()
        .filter_map(|(path, cell)| cell.try_get().map(|value| (path, value)))
        .collect();
    // A path holding a value owns its whole subtree.
    let visible: BTreeMap<&Path, &Value> = stored
        .iter()
        .filter(|(path, _)| !has_ancestor_in(path, &stored))
        .collect();
    unflatten(visible).unwrap_or_else(|err| {
        error!(error = %err, "stored paths do not form a tree");
        Value::Null
    })
}

/// Cells to write for `tree`: every registered path the tree reaches gets
/// its subtree, and every leaf outside those subtrees gets its value.
fn tree_writes(registry: &FormRegistry, tree: &Value) -> Result<BTreeMap<Path, Value>> {
    let leaves = flatten(tree)?;
    let registered = registry.registered_keys().try_get().unwrap_or_default();
    let mut writes: BTreeMap<Path, Value> = registered
        .into_iter()
        .filter_map(|key| get_in(tree, &key).cloned().map(|value| (key, value)))
        .collect();
    for (path, value) in leaves {
        if writes.contains_key(&path) || has_ancestor_in(&path, &writes) {
            continue;
        }
        debug!(path = %path, "seeding unregistered path");
        writes.insert(path, value);
    }
    Ok(writes)
}

/// The whole form tree, built from every path that holds a value.
#[must_use]
pub fn read_form(registry: &FormRegistry) -> Value {
    build_tree(registry.value_cells())
}

/// Current value of one path, `None` while it has none.
pub fn read_field(registry: &FormRegistry, key: impl Into<KeySelector>) -> Result<Option<Value>> {
    let path = resolve_path(key)?;
    Ok(registry.value_cell(&path).try_get())
}

pub fn read_initial_value(
    registry: &FormRegistry,
    key: impl Into<KeySelector>,
) -> Result<Option<Value>> {
    let path = resolve_path(key)?;
    Ok(registry.initial_cell(&path).try_get())
}

/// The tree of initial values.
#[must_use]
pub fn read_form_initial_value(registry: &FormRegistry) -> Value {
    build_tree(registry.initial_cells())
}

/// Write the value of a registered field.
pub fn set_field_value(
    registry: &FormRegistry,
    key: impl Into<KeySelector>,
    value: Value,
) -> Result<()> {
    if let Some(path) = registered_key(registry, key, "set value")? {
        registry.value_cell(&path).set_value(value);
    }
    Ok(())
}

/// Write `tree` into the form. Registered paths receive their subtree;
/// other leaves are seeded and picked up by a later registration.
pub fn set_form_value(registry: &FormRegistry, tree: &Value) -> Result<()> {
    for (path, value) in tree_writes(registry, tree)? {
        registry.value_cell(&path).set_value(value);
    }
    Ok(())
}

/// Replace the initial value of a registered field. The current value is
/// left alone.
pub fn set_initial_value(
    registry: &FormRegistry,
    key: impl Into<KeySelector>,
    value: Value,
) -> Result<()> {
    if let Some(path) = registered_key(registry, key, "set initial value")? {
        registry.initial_cell(&path).set_value(value);
    }
    Ok(())
}

pub fn set_form_initial_value(registry: &FormRegistry, tree: &Value) -> Result<()> {
    for (path, value) in tree_writes(registry, tree)? {
        registry.initial_cell(&path).set_value(value);
    }
    Ok(())
}

fn reset_path(registry: &FormRegistry, path: &Path) {
    let Some(initial) = registry.initial_cell(path).try_get() else {
        return;
    };
    registry.value_cell(path).set_value(initial);
    if let Some(control) = registry.control(path) {
        let touched = control.with(|state| state.is_some_and(|s| s.touched));
        if touched {
            let default_touched = registry.options().default_touched;
            control.update(|state| state.touched = default_touched);
        }
    }
}

/// Restore one field's value to its initial value and its touched flag to
/// the registry default.
pub fn reset_field(registry: &FormRegistry, key: impl Into<KeySelector>) -> Result<()> {
    if let Some(path) = registered_key(registry, key, "reset")? {
        reset_path(registry, &path);
    }
    Ok(())
}

/// Reset `keys`, or every path that holds a value when `None`.
pub fn reset_form(registry: &FormRegistry, keys: Option<&[Path]>) {
    let paths: Vec<Path> = match keys {
        Some(keys) => keys.to_vec(),
        None => registry.value_cells().into_iter().map(|(path, _)| path).collect(),
    };
    for path in &paths {
        reset_path(registry, path);
    }
}

/// Set the touched flag of `keys`, or of every registered field when
/// `None`. Fields already in that state are not notified.
pub fn touch_fields(registry: &FormRegistry, keys: Option<&[Path]>, touch: bool) {
    let paths: Vec<Path> = match keys {
        Some(keys) => keys.to_vec(),
        None => registry.registered_keys().try_get().unwrap_or_default().into_iter().collect(),
    };
    for path in paths {
        let Some(control) = registry.control(&path) else {
            warn!(path = %path, "field not registered, touch ignored");
            continue;
        };
        let current = control.with(|state| state.map(|s| s.touched));
        if current.is_some_and(|touched| touched != touch) {
            control.update(|state| state.touched = touch);
        }
    }
}

/// Push a manual error for a field. It shows until the field's value next
/// changes.
pub fn set_field_error(
    registry: &FormRegistry,
    key: impl Into<KeySelector>,
    error: ErrorResult,
) -> Result<()> {
    let path = resolve_path(key)?;
    match registry.control(&path).and_then(|control| control.try_get()) {
        Some(state) => state.manual_error.emit(error),
        None => warn!(path = %path, "can't set error: field not registered"),
    }
    Ok(())
}

/// Unregister a field, warning instead of failing when it is unknown.
pub fn unregister_control(registry: &FormRegistry, key: impl Into<KeySelector>) -> Result<()> {
    match registry.unregister_control(key) {
        Err(FormError::FieldNotRegistered { path }) => {
            warn!(path = %path, "field not registered, unregister ignored");
            Ok(())
        }
        other => other,
    }
}

/// Registered fields whose value differs from their initial value.
#[must_use]
pub fn get_field_changes(registry: &FormRegistry) -> Vec<FieldChange> {
    let keys = registry.registered_keys().try_get().unwrap_or_default();
    keys.into_iter()
        .filter_map(|key| {
            let initial = registry.initial_cell(&key).try_get()?;
            let value = registry.value_cell(&key).try_get()?;
            (initial != value).then_some(FieldChange {
                key,
                initial,
                value,
            })
        })
        .collect()
}

/// Current error of every registered field that has one.
#[must_use]
pub fn form_errors(registry: &FormRegistry) -> BTreeMap<Path, ErrorResult> {
    let keys = registry.registered_keys().try_get().unwrap_or_default();
    keys.into_iter()
        .filter_map(|key| {
            let state = registry.control(&key)?.try_get()?;
            let error = state.error.try_get()?;
            (!error.is_valid()).then_some((key, error))
        })
        .collect()
}

#[must_use]
pub fn is_valid(registry: &FormRegistry) -> Validity {
    Validity::reduce(form_errors(registry).values())
}

/// Whether a field's value equals its initial value.
pub fn is_pristine(registry: &FormRegistry, key: impl Into<KeySelector>) -> Result<bool> {
    let path = resolve_path(key)?;
    Ok(registry.value_cell(&path).try_get() == registry.initial_cell(&path).try_get())
}
