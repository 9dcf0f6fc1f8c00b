#![forbid(unsafe_code)]

//! Per-field state: the cells a registered field is made of, and the error
//! pipeline that turns validator results and manual overrides into one
//! error cell.

use formflow_path::KeySelector;
use formflow_reactive::operators::{
    combine, map, skip_synchronous, switch_map, take, with_default,
};
use formflow_reactive::{DerivedState, EventChannel, State};
use serde_json::Value;

use crate::outcome::{ErrorResult, combine_errors};
use crate::validator::Validator;

/// Interaction and validation state of one field.
#[derive(Debug, Clone)]
pub struct ControlState {
    pub touched: bool,
    pub validator: Validator,
    /// Fire-only channel for out-of-band errors. An emission overrides the
    /// validator result until the field's value next changes.
    pub manual_error: EventChannel<ErrorResult>,
    /// Validator result combined with the manual override.
    pub error: DerivedState<ErrorResult>,
}

/// The cells of one registered field.
#[derive(Debug, Clone)]
pub struct Field {
    pub value: State<Value>,
    pub initial_value: State<Value>,
    pub control_state: State<ControlState>,
}

/// Arguments of [`FormRegistry::register_control`](crate::FormRegistry::register_control).
#[derive(Debug, Clone)]
pub struct ControlOptions {
    pub key: KeySelector,
    pub initial_value: Option<Value>,
    pub validator: Option<Validator>,
}

impl ControlOptions {
    pub fn new(key: impl Into<KeySelector>) -> Self {
        Self {
            key: key.into(),
            initial_value: None,
            validator: None,
        }
    }

    #[must_use]
    pub fn with_initial_value(mut self, value: Value) -> Self {
        self.initial_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Latest manual override of a field.
///
/// Emits `Valid` until the channel fires; each emission is then forwarded
/// until the next change of `value`, which reverts it to `Valid`. A newer
/// emission replaces the pending revert.
pub(crate) fn manual_error_stream(
    channel: &EventChannel<ErrorResult>,
    value: &State<Value>,
) -> DerivedState<ErrorResult> {
    let value = value.clone();
    let overrides = switch_map(channel, move |error: &ErrorResult| {
        let next_change = take(&skip_synchronous(&value), 1);
        let cleared = map(&next_change, |_: &Value| ErrorResult::Valid);
        with_default(&cleared, error.clone())
    });
    with_default(&overrides, ErrorResult::Valid)
}

/// The field's error cell: `validator_error` merged with the manual stream.
pub(crate) fn combined_error(
    validator_error: &DerivedState<ErrorResult>,
    manual: &DerivedState<ErrorResult>,
) -> DerivedState<ErrorResult> {
    let both = combine(&[validator_error.clone(), manual.clone()]);
    map(&both, |results: &Vec<ErrorResult>| match results.as_slice() {
        [validator, manual] => combine_errors(validator, manual),
        _ => ErrorResult::Pending,
    })
}
