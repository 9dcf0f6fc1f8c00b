#![forbid(unsafe_code)]

//! Dependency-tracking validation engine.
//!
//! One [`FieldValidation`] per registered field. It runs the field's
//! validator whenever:
//!
//! - the field's own value cell emits (including the replay on start),
//! - the validator is replaced,
//! - any cell the validator has ever read through its [`FieldReader`]
//!   changes (not its replay).
//!
//! # Invariants
//!
//! 1. Dependencies only accumulate: a cell read once stays watched for the
//!    life of the engine, even if later runs do not read it.
//! 2. Each dependency cell is subscribed at most once (pointer identity).
//! 3. Every run gets a fresh run id. An asynchronous result is applied only
//!    if its run id is still the latest, so a slow result never overwrites a
//!    fresher one.
//! 4. A run requested while the validator is executing is deferred and
//!    performed right after the current run, never recursively.
//! 5. After `dispose()`, no callback of this engine fires and nothing is
//!    emitted.
//!
//! # Failure Modes
//!
//! - **Dependency without value**: the result is pending and a warning is
//!   logged. The dependency is still watched, so the field re-validates as
//!   soon as the dependency gets a value.
//! - **Validator error**: logged as an error, the result is pending.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use formflow_path::Path;
use formflow_reactive::{Next, State, Subscription};
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::error::ValidationError;
use crate::outcome::ErrorResult;
use crate::pending::PendingQueue;
use crate::validator::{FieldReader, Validator, ValidatorOutput, Verdict};

/// Finds (or lazily creates) the value cell of any path. `None` once the
/// owning registry is gone.
pub(crate) type CellResolver = Rc<dyn Fn(&Path) -> Option<State<Value>>>;

#[derive(Default)]
struct EngineState {
    output: Option<Next<ErrorResult>>,
    dependencies: Vec<State<Value>>,
    subscriptions: Vec<Subscription>,
    run_id: u64,
    running: bool,
    rerun: bool,
    disposed: bool,
}

pub(crate) struct FieldValidation {
    path: Path,
    value: State<Value>,
    validator: RefCell<Validator>,
    resolver: CellResolver,
    pending: PendingQueue,
    state: RefCell<EngineState>,
}

impl FieldValidation {
    pub(crate) fn new(
        path: Path,
        value: State<Value>,
        validator: Validator,
        resolver: CellResolver,
        pending: PendingQueue,
    ) -> Rc<Self> {
        Rc::new(Self {
            path,
            value,
            validator: RefCell::new(validator),
            resolver,
            pending,
            state: RefCell::new(EngineState::default()),
        })
    }

    /// Start emitting into `output` and run the validator against the
    /// current value. The returned guard disposes the engine; it is meant
    /// to be the teardown of the derived error cell.
    pub(crate) fn start(self: &Rc<Self>, output: Next<ErrorResult>) -> Subscription {
        self.state.borrow_mut().output = Some(output);
        let weak = Rc::downgrade(self);
        let sub = self.value.subscribe(move |_| {
            if let Some(engine) = weak.upgrade() {
                engine.run();
            }
        });
        self.hold(sub);
        let engine = Rc::clone(self);
        Subscription::from_fn(move || engine.dispose())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Keep `sub` alive until disposal. Dropped immediately if already
    /// disposed.
    pub(crate) fn hold(&self, sub: Subscription) {
        let mut state = self.state.borrow_mut();
        if !state.disposed {
            state.subscriptions.push(sub);
        }
    }

    /// Swap in `validator` and re-run, unless it is the one already in use.
    pub(crate) fn replace_validator(self: &Rc<Self>, validator: &Validator) {
        if self.validator.borrow().ptr_eq(validator) {
            return;
        }
        *self.validator.borrow_mut() = validator.clone();
        self.run();
    }

    /// Whether `cell` is among the observed dependencies.
    pub(crate) fn observes(&self, cell: &State<Value>) -> bool {
        self.state
            .borrow()
            .dependencies
            .iter()
            .any(|dep| dep.ptr_eq(cell))
    }

    #[cfg(test)]
    pub(crate) fn dependency_count(&self) -> usize {
        self.state.borrow().dependencies.len()
    }

    /// Run the validator now, or right after the run in progress.
    pub(crate) fn run(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                return;
            }
            if state.running {
                state.rerun = true;
                return;
            }
            state.running = true;
        }
        loop {
            self.run_once();
            let mut state = self.state.borrow_mut();
            if state.rerun && !state.disposed {
                state.rerun = false;
                continue;
            }
            state.running = false;
            state.rerun = false;
            break;
        }
    }

    fn run_once(self: &Rc<Self>) {
        let Some(value) = self.value.try_get() else {
            error!(path = %self.path, "validation requested before the field has a value");
            return;
        };
        let validator = self.validator.borrow().clone();
        let run_id = {
            let mut state = self.state.borrow_mut();
            state.run_id += 1;
            state.run_id
        };
        trace!(path = %self.path, run_id, "running validator");

        let read = |target: &Path| -> Option<Value> {
            let cell = (self.resolver)(target)?;
            self.observe(&cell);
            cell.try_get()
        };
        let outcome = match validator.validate(&value, &FieldReader::new(&read)) {
            Ok(ValidatorOutput::Ready(verdict)) => ErrorResult::from(verdict),
            Ok(ValidatorOutput::Deferred(future)) => {
                self.pending
                    .enqueue(self.path.clone(), run_id, Rc::downgrade(self), future);
                ErrorResult::Pending
            }
            Err(ValidationError::ValueNotThereYet { path: dependency }) => {
                warn!(
                    path = %self.path,
                    dependency = %dependency,
                    "setting field error to pending: validation depends on a field that has no value yet"
                );
                ErrorResult::Pending
            }
            Err(err) => {
                error!(path = %self.path, error = %err, "validator failed");
                ErrorResult::Pending
            }
        };
        self.emit(outcome);
    }

    fn emit(&self, outcome: ErrorResult) {
        let output = {
            let state = self.state.borrow();
            if state.disposed {
                return;
            }
            state.output.clone()
        };
        if let Some(output) = output {
            output.emit(outcome);
        }
    }

    /// Start watching `cell` if it is not watched yet.
    fn observe(self: &Rc<Self>, cell: &State<Value>) {
        {
            let mut state = self.state.borrow_mut();
            if state.disposed || state.dependencies.iter().any(|dep| dep.ptr_eq(cell)) {
                return;
            }
            state.dependencies.push(cell.clone());
        }
        let weak: Weak<Self> = Rc::downgrade(self);
        let sub = cell.subscribe_changes(move |_| {
            if let Some(engine) = weak.upgrade() {
                engine.run();
            }
        });
        self.hold(sub);
    }

    /// Apply the result of an asynchronous run.
    pub(crate) fn resolve(&self, run_id: u64, result: Result<Verdict, ValidationError>) {
        {
            let state = self.state.borrow();
            if state.disposed {
                return;
            }
            if state.run_id != run_id {
                debug!(path = %self.path, run_id, latest = state.run_id, "discarding stale asynchronous validation result");
                return;
            }
        }
        let outcome = match result {
            Ok(verdict) => ErrorResult::from(verdict),
            Err(ValidationError::ValueNotThereYet { path: dependency }) => {
                warn!(
                    path = %self.path,
                    dependency = %dependency,
                    "asynchronous validation depends on a field that has no value yet"
                );
                ErrorResult::Pending
            }
            Err(err) => {
                error!(path = %self.path, error = %err, "asynchronous validator failed");
                ErrorResult::Pending
            }
        };
        self.emit(outcome);
    }

    /// Drop every subscription. Idempotent.
    pub(crate) fn dispose(&self) {
        let subscriptions = {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.output = None;
            state.dependencies.clear();
            std::mem::take(&mut state.subscriptions)
        };
        drop(subscriptions);
        debug!(path = %self.path, "validation engine disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;
    use formflow_reactive::DerivedState;
    use serde_json::json;

    struct Harness {
        cells: Rc<RefCell<AHashMap<Path, State<Value>>>>,
        pending: PendingQueue,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                cells: Rc::default(),
                pending: PendingQueue::default(),
            }
        }

        fn cell(&self, path: &str) -> State<Value> {
            self.cells
                .borrow_mut()
                .entry(Path::from(path))
                .or_insert_with(State::empty)
                .clone()
        }

        fn resolver(&self) -> CellResolver {
            let cells = Rc::clone(&self.cells);
            Rc::new(move |path: &Path| {
                Some(
                    cells
                        .borrow_mut()
                        .entry(path.clone())
                        .or_insert_with(State::empty)
                        .clone(),
                )
            })
        }

        fn start(
            &self,
            path: &str,
            validator: Validator,
        ) -> (Rc<FieldValidation>, DerivedState<ErrorResult>) {
            let engine = FieldValidation::new(
                Path::from(path),
                self.cell(path),
                validator,
                self.resolver(),
                self.pending.clone(),
            );
            let error = DerivedState::new(|next| engine.start(next));
            (engine, error)
        }
    }

    fn at_most_field(other: &'static str) -> Validator {
        Validator::from_verdict(move |value, reader| {
            let limit = reader.get(other)?;
            Ok(Verdict::from(value.as_f64() <= limit.as_f64()))
        })
    }

    #[test]
    fn runs_on_start_and_on_own_change() {
        let h = Harness::new();
        h.cell("age").set_value(json!(-1));
        let validator =
            Validator::from_verdict(|v, _| Ok(Verdict::from(v.as_i64().unwrap_or(0) >= 0)));
        let (_engine, error) = h.start("age", validator);
        assert_eq!(error.value(), Ok(ErrorResult::Messages(vec![])));

        h.cell("age").set_value(json!(5));
        assert_eq!(error.value(), Ok(ErrorResult::Valid));
    }

    #[test]
    fn dependency_change_reruns_with_latest_own_value() {
        let h = Harness::new();
        h.cell("max").set_value(json!(10));
        h.cell("min").set_value(json!(12));
        let (_engine, error) = h.start("min", at_most_field("max"));
        assert!(error.value().expect("ran").is_error());

        h.cell("max").set_value(json!(15));
        assert_eq!(error.value(), Ok(ErrorResult::Valid));
    }

    #[test]
    fn dependencies_are_observed_once_and_accumulate() {
        let h = Harness::new();
        h.cell("flag").set_value(json!(true));
        h.cell("a").set_value(json!(1));
        h.cell("b").set_value(json!(2));
        h.cell("x").set_value(json!(0));
        let validator = Validator::from_verdict(|_, reader| {
            let use_a = reader.get("flag")?.as_bool().unwrap_or(false);
            reader.get(if use_a { "a" } else { "b" })?;
            Ok(Verdict::Valid)
        });
        let (engine, _error) = h.start("x", validator);
        assert_eq!(engine.dependency_count(), 2);

        h.cell("a").set_value(json!(3));
        assert_eq!(engine.dependency_count(), 2);

        h.cell("flag").set_value(json!(false));
        assert_eq!(engine.dependency_count(), 3);
        assert!(engine.observes(&h.cell("a")), "a stays watched");
    }

    #[test]
    fn missing_dependency_is_pending_until_it_gets_a_value() {
        let h = Harness::new();
        h.cell("min").set_value(json!(3));
        let (_engine, error) = h.start("min", at_most_field("max"));
        assert_eq!(error.value(), Ok(ErrorResult::Pending));

        h.cell("max").set_value(json!(1));
        assert_eq!(error.value(), Ok(ErrorResult::Messages(vec![])));
    }

    #[test]
    fn validator_failure_degrades_to_pending() {
        let h = Harness::new();
        h.cell("x").set_value(json!(1));
        let validator = Validator::from_verdict(|_, _| Err(ValidationError::failed("boom")));
        let (_engine, error) = h.start("x", validator);
        assert_eq!(error.value(), Ok(ErrorResult::Pending));
    }

    #[test]
    fn replacing_validator_reruns_only_when_different() {
        let h = Harness::new();
        h.cell("x").set_value(json!(1));
        let valid = Validator::from_verdict(|_, _| Ok(Verdict::Valid));
        let (engine, error) = h.start("x", valid.clone());
        let runs = error.version();

        engine.replace_validator(&valid);
        assert_eq!(error.version(), runs);

        engine.replace_validator(&Validator::from_verdict(|_, _| Ok(Verdict::Invalid)));
        assert_eq!(error.value(), Ok(ErrorResult::Messages(vec![])));
    }

    #[test]
    fn stale_async_result_is_discarded() {
        let h = Harness::new();
        h.cell("x").set_value(json!(1));
        let validator = Validator::new(|value, _| {
            let valid = value.as_i64() == Some(2);
            Ok(ValidatorOutput::deferred(async move {
                Ok::<_, ValidationError>(Verdict::from(valid))
            }))
        });
        let (engine, error) = h.start("x", validator);
        assert_eq!(error.value(), Ok(ErrorResult::Pending));

        engine.resolve(1, Ok(Verdict::Invalid));
        assert_eq!(error.value(), Ok(ErrorResult::Messages(vec![])));

        h.cell("x").set_value(json!(2));
        engine.resolve(1, Ok(Verdict::Invalid));
        assert_eq!(error.value(), Ok(ErrorResult::Pending), "run 1 is stale");

        assert_eq!(h.pending.run_until_stalled(), 1);
        assert_eq!(error.value(), Ok(ErrorResult::Valid));
    }

    #[test]
    fn reentrant_run_is_deferred_not_recursive() {
        let h = Harness::new();
        let own = h.cell("x");
        own.set_value(json!(0));
        let depth = Rc::new(std::cell::Cell::new(0u32));
        let max_depth = Rc::new(std::cell::Cell::new(0u32));
        let (d, m, writer) = (Rc::clone(&depth), Rc::clone(&max_depth), own.clone());
        let validator = Validator::from_verdict(move |value, _| {
            d.set(d.get() + 1);
            m.set(m.get().max(d.get()));
            let n = value.as_i64().unwrap_or(0);
            if n < 3 {
                writer.set_value(json!(n + 1));
            }
            d.set(d.get() - 1);
            Ok(Verdict::Valid)
        });
        let (_engine, _error) = h.start("x", validator);
        assert_eq!(own.value(), Ok(json!(3)));
        assert_eq!(max_depth.get(), 1);
    }

    #[test]
    fn dispose_stops_reacting() {
        let h = Harness::new();
        h.cell("max").set_value(json!(10));
        h.cell("min").set_value(json!(12));
        let (engine, error) = h.start("min", at_most_field("max"));
        let version = error.version();

        engine.dispose();
        h.cell("max").set_value(json!(20));
        h.cell("min").set_value(json!(1));
        assert_eq!(error.version(), version);
        assert!(!engine.observes(&h.cell("max")));
    }
}
