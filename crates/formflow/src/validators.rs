#![forbid(unsafe_code)]

//! Ready-made validators and combinators.
//!
//! Numeric validators read their input the way form inputs arrive: JSON
//! numbers, numeric strings, booleans and `null` all count as numbers.
//! Anything that does not convert is left to [`is_number`]; the comparison
//! validators accept it.
//!
//! ```
//! use formflow::validators::{is_at_least, is_number, pipe_validators};
//!
//! let age = pipe_validators(vec![is_number(), is_at_least(18.0)]);
//! # let _ = age;
//! ```

use std::fmt;
use std::rc::Rc;

use formflow_path::Path;
use serde_json::Value;

use crate::error::ValidationError;
use crate::validator::{FieldReader, Validator, ValidatorOutput, Verdict};

/// Numeric form of `value`, `None` when it has none.
fn to_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Null => 0.0,
        Value::Bool(flag) => f64::from(u8::from(*flag)),
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                0.0
            } else {
                text.parse().ok()?
            }
        }
        Value::Array(_) | Value::Object(_) => return None,
    };
    (!number.is_nan()).then_some(number)
}

type ComputeFn = dyn Fn(&FieldReader<'_>) -> Result<f64, ValidationError>;

/// Bound of a comparison validator.
#[derive(Clone)]
pub enum Threshold {
    Value(f64),
    /// The current value of another field. Reading it makes that field a
    /// dependency.
    Field(Path),
    Computed(Rc<ComputeFn>),
}

impl Threshold {
    pub fn computed(
        compute: impl Fn(&FieldReader<'_>) -> Result<f64, ValidationError> + 'static,
    ) -> Self {
        Self::Computed(Rc::new(compute))
    }

    fn resolve(&self, reader: &FieldReader<'_>) -> Result<Option<f64>, ValidationError> {
        match self {
            Self::Value(limit) => Ok(Some(*limit)),
            Self::Field(path) => Ok(to_number(&reader.get(path)?)),
            Self::Computed(compute) => Ok(Some(compute(reader)?).filter(|n| !n.is_nan())),
        }
    }
}

impl fmt::Debug for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(limit) => f.debug_tuple("Value").field(limit).finish(),
            Self::Field(path) => f.debug_tuple("Field").field(path).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<f64> for Threshold {
    fn from(limit: f64) -> Self {
        Self::Value(limit)
    }
}

impl From<i64> for Threshold {
    // Form thresholds are far below 2^53.
    #[allow(clippy::cast_precision_loss)]
    fn from(limit: i64) -> Self {
        Self::Value(limit as f64)
    }
}

impl From<&str> for Threshold {
    fn from(path: &str) -> Self {
        Self::Field(Path::from(path))
    }
}

impl From<Path> for Threshold {
    fn from(path: Path) -> Self {
        Self::Field(path)
    }
}

/// Rejects `null`, empty strings and empty arrays.
#[must_use]
pub fn is_required() -> Validator {
    Validator::from_verdict(|value, _| {
        let missing = match value {
            Value::Null => true,
            Value::String(text) => text.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        Ok(if missing {
            Verdict::messages(["Required"])
        } else {
            Verdict::Valid
        })
    })
}

#[must_use]
pub fn is_number() -> Validator {
    Validator::from_verdict(|value, _| {
        Ok(match to_number(value) {
            Some(_) => Verdict::Valid,
            None => Verdict::messages(["Expected a number"]),
        })
    })
}

/// Accepts numbers and numeric strings without a fractional part.
#[must_use]
pub fn is_integer() -> Validator {
    Validator::from_verdict(|value, _| {
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(match number {
            Some(n) if n.is_finite() && n.fract() == 0.0 => Verdict::Valid,
            _ => Verdict::messages(["Expected an integer"]),
        })
    })
}

fn compare(threshold: Threshold, fails: fn(f64, f64) -> bool, message: &'static str) -> Validator {
    Validator::from_verdict(move |value, reader| {
        let Some(limit) = threshold.resolve(reader)? else {
            return Ok(Verdict::Valid);
        };
        Ok(match to_number(value) {
            Some(number) if fails(number, limit) => Verdict::Messages(vec![format!("{message} {limit}")]),
            _ => Verdict::Valid,
        })
    })
}

#[must_use]
pub fn is_at_least(threshold: impl Into<Threshold>) -> Validator {
    compare(threshold.into(), |n, limit| n < limit, "Expected a value of at least")
}

#[must_use]
pub fn is_greater_than(threshold: impl Into<Threshold>) -> Validator {
    compare(threshold.into(), |n, limit| n <= limit, "Expected a value greater than")
}

#[must_use]
pub fn is_at_most(threshold: impl Into<Threshold>) -> Validator {
    compare(threshold.into(), |n, limit| n > limit, "Expected a value of at most")
}

#[must_use]
pub fn is_less_than(threshold: impl Into<Threshold>) -> Validator {
    compare(threshold.into(), |n, limit| n >= limit, "Expected a value less than")
}

/// Runs `validators` in order; the first result that is not `Valid` wins.
///
/// While every result is immediate the chain stops at the first failure.
/// Once a deferred result shows up, the remaining validators are run right
/// away and their results are awaited in order.
#[must_use]
pub fn pipe_validators(validators: Vec<Validator>) -> Validator {
    Validator::new(move |value, reader| {
        let mut outputs = Vec::new();
        let mut deferred = false;
        for validator in &validators {
            match validator.validate(value, reader) {
                Ok(ValidatorOutput::Ready(verdict)) if !deferred => {
                    if !verdict.is_valid() {
                        return Ok(ValidatorOutput::Ready(verdict));
                    }
                }
                Err(err) if !deferred => return Err(err),
                output => {
                    deferred |= matches!(output, Ok(ValidatorOutput::Deferred(_)));
                    outputs.push(output);
                }
            }
        }
        if outputs.is_empty() {
            return Ok(ValidatorOutput::Ready(Verdict::Valid));
        }
        Ok(ValidatorOutput::deferred(async move {
            for output in outputs {
                let verdict = match output? {
                    ValidatorOutput::Ready(verdict) => verdict,
                    ValidatorOutput::Deferred(future) => future.await?,
                };
                if !verdict.is_valid() {
                    return Ok(verdict);
                }
            }
            Ok::<_, ValidationError>(Verdict::Valid)
        }))
    })
}

fn merge_verdicts(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
    let mut messages = Vec::new();
    let mut invalid = false;
    for verdict in verdicts {
        match verdict {
            Verdict::Valid => {}
            Verdict::Invalid => invalid = true,
            Verdict::Messages(found) => messages.extend(found),
        }
    }
    if !messages.is_empty() {
        Verdict::Messages(messages)
    } else if invalid {
        Verdict::Invalid
    } else {
        Verdict::Valid
    }
}

/// Runs every validator and concatenates their messages. Without any
/// message the result is `Invalid` if some validator said so.
#[must_use]
pub fn merge_validators(validators: Vec<Validator>) -> Validator {
    Validator::new(move |value, reader| {
        let mut outputs = Vec::with_capacity(validators.len());
        for validator in &validators {
            outputs.push(validator.validate(value, reader)?);
        }
        if outputs.iter().all(|output| matches!(output, ValidatorOutput::Ready(_))) {
            let verdicts = outputs.into_iter().filter_map(|output| match output {
                ValidatorOutput::Ready(verdict) => Some(verdict),
                ValidatorOutput::Deferred(_) => None,
            });
            return Ok(ValidatorOutput::Ready(merge_verdicts(verdicts)));
        }
        Ok(ValidatorOutput::deferred(async move {
            let mut verdicts = Vec::with_capacity(outputs.len());
            for output in outputs {
                verdicts.push(match output {
                    ValidatorOutput::Ready(verdict) => verdict,
                    ValidatorOutput::Deferred(future) => future.await?,
                });
            }
            Ok::<_, ValidationError>(merge_verdicts(verdicts))
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use serde_json::json;

    fn run(validator: &Validator, value: Value) -> Verdict {
        run_with(validator, value, &|_| None)
    }

    fn run_with(
        validator: &Validator,
        value: Value,
        read: &dyn Fn(&Path) -> Option<Value>,
    ) -> Verdict {
        match validator.validate(&value, &FieldReader::new(read)) {
            Ok(ValidatorOutput::Ready(verdict)) => verdict,
            Ok(ValidatorOutput::Deferred(future)) => future
                .now_or_never()
                .expect("deferred result resolves immediately")
                .expect("no validation error"),
            Err(err) => panic!("validator failed: {err}"),
        }
    }

    fn deferred(verdict: Verdict) -> Validator {
        Validator::new(move |_, _| {
            let verdict = verdict.clone();
            Ok(ValidatorOutput::deferred(async move { Ok::<_, ValidationError>(verdict) }))
        })
    }

    #[test]
    fn required_rejects_empty_inputs() {
        let v = is_required();
        for empty in [json!(null), json!(""), json!([])] {
            assert_eq!(run(&v, empty), Verdict::messages(["Required"]));
        }
        for present in [json!(0), json!(false), json!("x"), json!({})] {
            assert_eq!(run(&v, present), Verdict::Valid);
        }
    }

    #[test]
    fn number_accepts_numeric_strings() {
        let v = is_number();
        assert_eq!(run(&v, json!("12.5")), Verdict::Valid);
        assert_eq!(run(&v, json!(null)), Verdict::Valid);
        assert_eq!(run(&v, json!("abc")), Verdict::messages(["Expected a number"]));
    }

    #[test]
    fn integer_rejects_fractions() {
        let v = is_integer();
        assert_eq!(run(&v, json!(4)), Verdict::Valid);
        assert_eq!(run(&v, json!("7")), Verdict::Valid);
        assert_eq!(run(&v, json!(1.5)), Verdict::messages(["Expected an integer"]));
        assert_eq!(run(&v, json!(null)), Verdict::messages(["Expected an integer"]));
    }

    #[test]
    fn comparisons_format_threshold() {
        assert_eq!(
            run(&is_at_least(10.0), json!(3)),
            Verdict::messages(["Expected a value of at least 10"])
        );
        assert_eq!(
            run(&is_greater_than(2.5), json!("2.5")),
            Verdict::messages(["Expected a value greater than 2.5"])
        );
        assert_eq!(run(&is_at_most(10_i64), json!(10)), Verdict::Valid);
        assert_eq!(
            run(&is_less_than(0.0), json!(0)),
            Verdict::messages(["Expected a value less than 0"])
        );
    }

    #[test]
    fn non_numeric_values_pass_comparisons() {
        assert_eq!(run(&is_at_least(1.0), json!("abc")), Verdict::Valid);
    }

    #[test]
    fn field_threshold_reads_other_field() {
        let read = |path: &Path| (path.as_str() == "max").then(|| json!(10));
        assert_eq!(
            run_with(&is_at_most("max"), json!(12), &read),
            Verdict::messages(["Expected a value of at most 10"])
        );
        assert_eq!(run_with(&is_at_most("max"), json!(9), &read), Verdict::Valid);
    }

    #[test]
    fn missing_threshold_field_is_reported() {
        let result = is_at_most("max").validate(&json!(1), &FieldReader::new(&|_| None));
        assert!(matches!(result, Err(ValidationError::ValueNotThereYet { .. })));
    }

    #[test]
    fn computed_threshold() {
        let double_min = Threshold::computed(|reader| {
            Ok(reader.get("min")?.as_f64().unwrap_or(0.0) * 2.0)
        });
        let read = |path: &Path| (path.as_str() == "min").then(|| json!(3));
        assert_eq!(
            run_with(&is_at_least(double_min), json!(5), &read),
            Verdict::messages(["Expected a value of at least 6"])
        );
    }

    #[test]
    fn pipe_stops_at_first_failure() {
        let v = pipe_validators(vec![is_number(), is_at_least(5.0)]);
        assert_eq!(run(&v, json!("x")), Verdict::messages(["Expected a number"]));
        assert_eq!(
            run(&v, json!(1)),
            Verdict::messages(["Expected a value of at least 5"])
        );
        assert_eq!(run(&v, json!(9)), Verdict::Valid);
    }

    #[test]
    fn pipe_keeps_order_across_deferred_results() {
        let v = pipe_validators(vec![
            deferred(Verdict::Valid),
            deferred(Verdict::messages(["second"])),
            Validator::from_verdict(|_, _| Ok(Verdict::messages(["third"]))),
        ]);
        assert_eq!(run(&v, json!(1)), Verdict::messages(["second"]));
    }

    #[test]
    fn merge_concatenates_messages() {
        let v = merge_validators(vec![
            Validator::from_verdict(|_, _| Ok(Verdict::messages(["a"]))),
            Validator::from_verdict(|_, _| Ok(Verdict::Invalid)),
            deferred(Verdict::messages(["b"])),
        ]);
        assert_eq!(run(&v, json!(1)), Verdict::messages(["a", "b"]));
    }

    #[test]
    fn merge_without_messages_reports_invalid() {
        let v = merge_validators(vec![
            Validator::from_verdict(|_, _| Ok(Verdict::Valid)),
            Validator::from_verdict(|_, _| Ok(Verdict::Invalid)),
        ]);
        assert_eq!(run(&v, json!(1)), Verdict::Invalid);
        assert_eq!(run(&merge_validators(vec![]), json!(1)), Verdict::Valid);
    }
}
