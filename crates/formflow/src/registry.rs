#![forbid(unsafe_code)]

//! Field registry.
//!
//! A [`FormRegistry`] owns every cell of one logical form: a value cell and
//! an initial-value cell per path, a control-state cell per registered
//! field, the validation engines, and the queue of in-flight asynchronous
//! validations. Handles are cheap clones of one shared registry.
//!
//! # Invariants
//!
//! 1. A path has at most one value cell for the life of the registry.
//!    Validators may reference a path before it registers; that creates an
//!    empty placeholder which the later registration seeds.
//! 2. Re-registering with the same key, initial value and validator emits
//!    nothing.
//! 3. No map borrow is held while a cell notifies, so subscribers may call
//!    back into the registry.
//! 4. After [`FormRegistry::dispose`], every cell the registry created is
//!    disposed and no subscriber registered through it fires again.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use formflow_path::{KeySelector, Path, flatten, get_in, resolve_path, unflatten};
use formflow_reactive::{DerivedState, EventChannel, State};
use serde_json::Value;
use tracing::debug;

use crate::config::RegistryOptions;
use crate::control::{ControlOptions, ControlState, Field, combined_error, manual_error_stream};
use crate::error::{FormError, Result};
use crate::pending::PendingQueue;
use crate::validation::{CellResolver, FieldValidation};
use crate::validator::Validator;

struct ControlEntry {
    control: State<ControlState>,
    engine: Rc<FieldValidation>,
}

pub(crate) struct RegistryInner {
    options: RegistryOptions,
    registered_keys: State<BTreeSet<Path>>,
    values: RefCell<AHashMap<Path, State<Value>>>,
    initial_values: RefCell<AHashMap<Path, State<Value>>>,
    controls: RefCell<AHashMap<Path, ControlEntry>>,
    pending: PendingQueue,
    disposed: Cell<bool>,
}

impl RegistryInner {
    fn cell_in(&self, map: &RefCell<AHashMap<Path, State<Value>>>, path: &Path) -> State<Value> {
        if self.disposed.get() {
            let inert = State::empty();
            inert.dispose();
            return inert;
        }
        map.borrow_mut()
            .entry(path.clone())
            .or_insert_with(State::empty)
            .clone()
    }

    pub(crate) fn value_cell(&self, path: &Path) -> State<Value> {
        self.cell_in(&self.values, path)
    }

    pub(crate) fn initial_cell(&self, path: &Path) -> State<Value> {
        self.cell_in(&self.initial_values, path)
    }

    /// The tree stored below `path` in `map`, if any descendant holds a value.
    fn subtree(&self, map: &RefCell<AHashMap<Path, State<Value>>>, path: &Path) -> Option<Value> {
        let cells: Vec<(Path, State<Value>)> = map
            .borrow()
            .iter()
            .filter(|(stored, _)| path.is_ancestor_of(stored))
            .map(|(stored, cell)| (stored.clone(), cell.clone()))
            .collect();
        let entries: BTreeMap<Path, Value> = cells
            .into_iter()
            .filter_map(|(stored, cell)| cell.try_get().map(|value| (stored, value)))
            .collect();
        if entries.is_empty() {
            return None;
        }
        let tree = unflatten(&entries).ok()?;
        get_in(&tree, path).cloned()
    }

    pub(crate) fn control(&self, path: &Path) -> Option<State<ControlState>> {
        self.controls
            .borrow()
            .get(path)
            .map(|entry| entry.control.clone())
    }
}

/// Shared handle to one form's state.
#[derive(Clone)]
pub struct FormRegistry {
    pub(crate) inner: Rc<RegistryInner>,
}

/// Create a registry. Same as [`FormRegistry::new`].
pub fn create_registry(options: RegistryOptions) -> Result<FormRegistry> {
    FormRegistry::new(options)
}

impl FormRegistry {
    /// Create a registry, seeding values and initial values from
    /// `options.initial_value`.
    ///
    /// Fails if the initial tree is a scalar.
    pub fn new(options: RegistryOptions) -> Result<Self> {
        let mut values = AHashMap::new();
        let mut initial_values = AHashMap::new();
        if let Some(tree) = &options.initial_value {
            for (path, value) in flatten(tree)? {
                initial_values.insert(path.clone(), State::new(value.clone()));
                values.insert(path, State::new(value));
            }
        }
        debug!(seeded = values.len(), "form registry created");
        Ok(Self {
            inner: Rc::new(RegistryInner {
                options,
                registered_keys: State::new(BTreeSet::new()),
                values: RefCell::new(values),
                initial_values: RefCell::new(initial_values),
                controls: RefCell::new(AHashMap::new()),
                pending: PendingQueue::default(),
                disposed: Cell::new(false),
            }),
        })
    }

    #[must_use]
    pub fn options(&self) -> &RegistryOptions {
        &self.inner.options
    }

    /// Register a field, or refresh the registration of an existing one.
    ///
    /// For a new key this seeds the initial-value cell (from the options,
    /// else from what the form tree already holds at or below the key, else
    /// `null`), seeds the value cell if empty, starts validation, and adds
    /// the key to [`registered_keys`](Self::registered_keys). A key naming
    /// an array or object receives the whole subtree.
    ///
    /// For a known key only what differs is applied: a different validator
    /// (by identity) is swapped in and re-run, a different initial value
    /// replaces the stored one, and an empty value cell is seeded.
    pub fn register_control(&self, options: ControlOptions) -> Result<()> {
        if self.inner.disposed.get() {
            return Err(FormError::Disposed);
        }
        let key = resolve_path(options.key)?;
        let validator = options.validator.unwrap_or_else(Validator::noop);
        let value = self.inner.value_cell(&key);
        let initial = self.inner.initial_cell(&key);

        if let Some(iv) = options.initial_value {
            if initial.try_get().as_ref() != Some(&iv) {
                initial.set_value(iv);
            }
        }

        if let Some(control) = self.inner.control(&key) {
            let same = control.with(|state| state.is_some_and(|s| s.validator.ptr_eq(&validator)));
            if !same {
                debug!(path = %key, "replacing validator");
                control.update(|state| state.validator = validator);
            }
            if !value.has_value() {
                value.set_value(initial.try_get().unwrap_or(Value::Null));
            }
            return Ok(());
        }

        if !initial.has_value() {
            let seed = self
                .inner
                .subtree(&self.inner.initial_values, &key)
                .or_else(|| value.try_get())
                .or_else(|| self.inner.subtree(&self.inner.values, &key))
                .unwrap_or(Value::Null);
            initial.set_value(seed);
        }
        if !value.has_value() {
            let seed = self
                .inner
                .subtree(&self.inner.values, &key)
                .or_else(|| initial.try_get())
                .unwrap_or(Value::Null);
            value.set_value(seed);
        }

        let engine = FieldValidation::new(
            key.clone(),
            value.clone(),
            validator.clone(),
            self.resolver(),
            self.inner.pending.clone(),
        );
        let validator_error = DerivedState::new(|next| engine.start(next));
        let manual_error = EventChannel::new();
        let manual = manual_error_stream(&manual_error, &value);
        let error = combined_error(&validator_error, &manual);

        let control = State::new(ControlState {
            touched: false,
            validator,
            manual_error,
            error,
        });
        let weak = Rc::downgrade(&engine);
        engine.hold(control.subscribe_changes(move |state: &ControlState| {
            if let Some(engine) = weak.upgrade() {
                engine.replace_validator(&state.validator);
            }
        }));

        self.inner.controls.borrow_mut().insert(
            key.clone(),
            ControlEntry {
                control,
                engine,
            },
        );
        self.inner.registered_keys.update(|keys| {
            keys.insert(key.clone());
        });
        debug!(path = %key, "control registered");
        Ok(())
    }

    /// Remove a field's control and release its cells.
    ///
    /// The value cell itself stays in place, emptied, so validators of
    /// other fields that read it see it as not there yet and report
    /// pending. Registering the key again revives it.
    pub fn unregister_control(&self, key: impl Into<KeySelector>) -> Result<()> {
        let key = resolve_path(key)?;
        let entry = self.inner.controls.borrow_mut().remove(&key);
        let Some(entry) = entry else {
            return Err(FormError::not_registered(&key));
        };
        self.inner.registered_keys.update(|keys| {
            keys.remove(&key);
        });

        entry.engine.dispose();
        if let Some(state) = entry.control.try_get() {
            state.error.dispose();
            state.manual_error.dispose();
        }
        entry.control.dispose();
        let initial = self.inner.initial_values.borrow_mut().remove(&key);
        if let Some(initial) = initial {
            initial.dispose();
        }

        let value = self.inner.values.borrow().get(&key).cloned();
        if let Some(value) = value {
            value.clear();
            let dependents: Vec<Rc<FieldValidation>> = self
                .inner
                .controls
                .borrow()
                .values()
                .filter(|entry| entry.engine.observes(&value))
                .map(|entry| Rc::clone(&entry.engine))
                .collect();
            for engine in dependents {
                debug!(path = %engine.path(), dependency = %key, "dependency unregistered, re-validating");
                engine.run();
            }
        }
        debug!(path = %key, "control unregistered");
        Ok(())
    }

    /// The cells of a registered field.
    pub fn field(&self, key: impl Into<KeySelector>) -> Result<Field> {
        let key = resolve_path(key)?;
        let control = self
            .inner
            .control(&key)
            .ok_or_else(|| FormError::not_registered(&key))?;
        Ok(Field {
            value: self.inner.value_cell(&key),
            initial_value: self.inner.initial_cell(&key),
            control_state: control,
        })
    }

    /// Cell holding the set of registered paths. Emits on every
    /// registration and unregistration.
    #[must_use]
    pub fn registered_keys(&self) -> State<BTreeSet<Path>> {
        self.inner.registered_keys.clone()
    }

    #[must_use]
    pub fn is_registered(&self, key: &Path) -> bool {
        self.inner.controls.borrow().contains_key(key)
    }

    /// Value cell of `key`, created empty if the path has never been seen.
    pub(crate) fn value_cell(&self, key: &Path) -> State<Value> {
        self.inner.value_cell(key)
    }

    pub(crate) fn initial_cell(&self, key: &Path) -> State<Value> {
        self.inner.initial_cell(key)
    }

    pub(crate) fn control(&self, key: &Path) -> Option<State<ControlState>> {
        self.inner.control(key)
    }

    /// Every path that currently has a value cell, registered or not.
    pub(crate) fn value_cells(&self) -> Vec<(Path, State<Value>)> {
        self.inner
            .values
            .borrow()
            .iter()
            .map(|(path, cell)| (path.clone(), cell.clone()))
            .collect()
    }

    pub(crate) fn initial_cells(&self) -> Vec<(Path, State<Value>)> {
        self.inner
            .initial_values
            .borrow()
            .iter()
            .map(|(path, cell)| (path.clone(), cell.clone()))
            .collect()
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryInner> {
        Rc::downgrade(&self.inner)
    }

    fn resolver(&self) -> CellResolver {
        let weak = self.downgrade();
        Rc::new(move |path: &Path| weak.upgrade().map(|inner| inner.value_cell(path)))
    }

    /// Poll in-flight asynchronous validations until none makes progress.
    /// Returns how many finished.
    pub fn run_until_stalled(&self) -> usize {
        self.inner.pending.run_until_stalled()
    }

    /// Future that completes once no asynchronous validation is in flight.
    pub fn settle(&self) -> impl Future<Output = ()> + 'static {
        self.inner.pending.settle()
    }

    #[must_use]
    pub fn pending_validations(&self) -> usize {
        self.inner.pending.len()
    }

    /// Release every field and cell. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let controls = std::mem::take(&mut *self.inner.controls.borrow_mut());
        let values = std::mem::take(&mut *self.inner.values.borrow_mut());
        let initial_values = std::mem::take(&mut *self.inner.initial_values.borrow_mut());
        self.inner.pending.clear();

        for entry in controls.values() {
            entry.engine.dispose();
            if let Some(state) = entry.control.try_get() {
                state.error.dispose();
                state.manual_error.dispose();
            }
            entry.control.dispose();
        }
        for cell in values.values().chain(initial_values.values()) {
            cell.dispose();
        }
        self.inner.registered_keys.dispose();
        debug!(fields = controls.len(), "form registry disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl Default for FormRegistry {
    fn default() -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                options: RegistryOptions::default(),
                registered_keys: State::new(BTreeSet::new()),
                values: RefCell::default(),
                initial_values: RefCell::default(),
                controls: RefCell::default(),
                pending: PendingQueue::default(),
                disposed: Cell::new(false),
            }),
        }
    }
}

impl fmt::Debug for FormRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormRegistry")
            .field("registered", &self.inner.controls.borrow().len())
            .field("cells", &self.inner.values.borrow().len())
            .field("pending", &self.inner.pending.len())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ErrorResult;
    use crate::validator::Verdict;
    use serde_json::json;

    fn registry() -> FormRegistry {
        FormRegistry::new(
            RegistryOptions::default().with_initial_value(json!({ "name": "Ada", "age": 36 })),
        )
        .unwrap()
    }

    #[test]
    fn container_key_is_seeded_with_its_subtree() {
        let reg = FormRegistry::new(RegistryOptions::default().with_initial_value(json!({
            "tags": ["a", "b"],
            "profile": { "name": "Ada", "langs": ["en"] },
        })))
        .unwrap();
        reg.register_control(ControlOptions::new("tags")).unwrap();
        reg.register_control(ControlOptions::new("profile")).unwrap();

        let tags = reg.field("tags").unwrap();
        assert_eq!(tags.value.value(), Ok(json!(["a", "b"])));
        assert_eq!(tags.initial_value.value(), Ok(json!(["a", "b"])));
        assert_eq!(
            reg.field("profile").unwrap().value.value(),
            Ok(json!({ "name": "Ada", "langs": ["en"] }))
        );
    }

    #[test]
    fn unknown_key_without_tree_is_seeded_null() {
        let reg = registry();
        reg.register_control(ControlOptions::new("nickname")).unwrap();
        assert_eq!(reg.field("nickname").unwrap().value.value(), Ok(Value::Null));
    }

    #[test]
    fn initial_tree_seeds_values_and_initials() {
        let reg = registry();
        reg.register_control(ControlOptions::new("name")).unwrap();
        let field = reg.field("name").unwrap();
        assert_eq!(field.value.value(), Ok(json!("Ada")));
        assert_eq!(field.initial_value.value(), Ok(json!("Ada")));
    }

    #[test]
    fn scalar_initial_tree_is_rejected() {
        let err = FormRegistry::new(RegistryOptions::default().with_initial_value(json!(3)));
        assert!(matches!(err, Err(FormError::Path(_))));
    }

    #[test]
    fn registration_without_initial_value_seeds_null() {
        let reg = FormRegistry::default();
        reg.register_control(ControlOptions::new("x")).unwrap();
        let field = reg.field("x").unwrap();
        assert_eq!(field.value.value(), Ok(Value::Null));
        assert_eq!(field.initial_value.value(), Ok(Value::Null));
    }

    #[test]
    fn new_key_notifies_registered_keys_once() {
        let reg = FormRegistry::default();
        let keys = reg.registered_keys();
        let before = keys.version();
        reg.register_control(ControlOptions::new("a").with_initial_value(json!(1))).unwrap();
        reg.register_control(ControlOptions::new("a").with_initial_value(json!(1))).unwrap();
        assert_eq!(keys.version(), before + 1);
        assert!(reg.is_registered(&Path::from("a")));
    }

    #[test]
    fn reregistration_with_new_initial_keeps_current_value() {
        let reg = FormRegistry::default();
        reg.register_control(ControlOptions::new("a").with_initial_value(json!(1))).unwrap();
        reg.field("a").unwrap().value.set_value(json!(5));
        reg.register_control(ControlOptions::new("a").with_initial_value(json!(2))).unwrap();
        let field = reg.field("a").unwrap();
        assert_eq!(field.initial_value.value(), Ok(json!(2)));
        assert_eq!(field.value.value(), Ok(json!(5)));
    }

    #[test]
    fn new_validator_replaces_old_and_reruns() {
        let reg = FormRegistry::default();
        reg.register_control(ControlOptions::new("a").with_initial_value(json!(1))).unwrap();
        let error = reg.field("a").unwrap().control_state.value().unwrap().error;
        assert_eq!(error.value(), Ok(ErrorResult::Valid));

        let reject = Validator::from_verdict(|_, _| Ok(Verdict::messages(["no"])));
        reg.register_control(ControlOptions::new("a").with_validator(reject)).unwrap();
        assert_eq!(error.value(), Ok(ErrorResult::messages(["no"])));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let reg = FormRegistry::default();
        assert_eq!(
            reg.field("nope").err(),
            Some(FormError::not_registered(&Path::from("nope")))
        );
        assert!(reg.unregister_control("nope").is_err());
    }

    #[test]
    fn invalid_key_is_rejected() {
        let reg = FormRegistry::default();
        assert!(matches!(
            reg.register_control(ControlOptions::new("a..b")),
            Err(FormError::Path(_))
        ));
    }

    #[test]
    fn unregister_empties_value_and_removes_key() {
        let reg = registry();
        reg.register_control(ControlOptions::new("age")).unwrap();
        let value = reg.field("age").unwrap().value;
        reg.unregister_control("age").unwrap();
        assert!(!value.has_value());
        assert!(!reg.is_registered(&Path::from("age")));
        assert!(reg.registered_keys().value().unwrap().is_empty());
    }

    #[test]
    fn registering_after_dispose_fails() {
        let reg = FormRegistry::default();
        reg.dispose();
        reg.dispose();
        assert!(reg.is_disposed());
        assert_eq!(
            reg.register_control(ControlOptions::new("a")),
            Err(FormError::Disposed)
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn missing_dependency_logs_warning_and_pends() {
        let reg = FormRegistry::default();
        let reads_b = Validator::from_verdict(|_, reader| {
            reader.get("b")?;
            Ok(Verdict::Valid)
        });
        reg.register_control(ControlOptions::new("a").with_validator(reads_b))
            .unwrap();

        let error = reg.field("a").unwrap().control_state.value().unwrap().error;
        assert_eq!(error.value(), Ok(ErrorResult::Pending));
        assert!(logs_contain("has no value yet"));
    }

    #[test]
    fn debug_reports_counts() {
        let reg = registry();
        reg.register_control(ControlOptions::new("name")).unwrap();
        let text = format!("{reg:?}");
        assert!(text.contains("registered: 1"));
        assert!(text.contains("cells: 2"));
    }
}
