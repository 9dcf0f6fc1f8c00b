#![forbid(unsafe_code)]

//! Validator contract.
//!
//! A [`Validator`] receives the field's current value and a [`FieldReader`]
//! for reading other fields. It returns either a verdict right away or a
//! future that produces one later. Reads made through the reader become
//! dependencies of the field: when any of them changes, the validator runs
//! again.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use formflow_path::{KeySelector, Path, resolve_path};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use serde_json::Value;

use crate::error::ValidationError;
use crate::outcome::ErrorResult;

/// What a validator concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// Invalid without any message.
    Invalid,
    Messages(Vec<String>),
}

impl Verdict {
    pub fn messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Messages(messages.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl From<bool> for Verdict {
    fn from(valid: bool) -> Self {
        if valid { Self::Valid } else { Self::Invalid }
    }
}

impl From<Vec<String>> for Verdict {
    fn from(messages: Vec<String>) -> Self {
        Self::Messages(messages)
    }
}

/// `Valid` maps to no error; `Invalid` maps to an empty message list.
impl From<Verdict> for ErrorResult {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Valid => Self::Valid,
            Verdict::Invalid => Self::Messages(Vec::new()),
            Verdict::Messages(messages) => Self::Messages(messages),
        }
    }
}

/// Future produced by an asynchronous validator.
pub type DeferredVerdict = LocalBoxFuture<'static, Result<Verdict, ValidationError>>;

/// Immediate or deferred validator result.
pub enum ValidatorOutput {
    Ready(Verdict),
    Deferred(DeferredVerdict),
}

impl ValidatorOutput {
    /// Wrap a future as a deferred result.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Verdict, ValidationError>> + 'static,
    {
        Self::Deferred(future.boxed_local())
    }
}

impl fmt::Debug for ValidatorOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(verdict) => f.debug_tuple("Ready").field(verdict).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Verdict> for ValidatorOutput {
    fn from(verdict: Verdict) -> Self {
        Self::Ready(verdict)
    }
}

/// Reads other fields' current values on behalf of a validator.
pub struct FieldReader<'a> {
    read: &'a dyn Fn(&Path) -> Option<Value>,
}

impl<'a> FieldReader<'a> {
    /// Reader backed by `read`, which returns `None` for fields without a
    /// value.
    pub fn new(read: &'a dyn Fn(&Path) -> Option<Value>) -> Self {
        Self { read }
    }

    /// Current value of the selected field.
    ///
    /// Fails with [`ValidationError::ValueNotThereYet`] when the field has no
    /// value; the read still counts as a dependency.
    pub fn get(&self, selector: impl Into<KeySelector>) -> Result<Value, ValidationError> {
        let path = resolve_path(selector)?;
        (self.read)(&path).ok_or(ValidationError::ValueNotThereYet { path })
    }
}

impl fmt::Debug for FieldReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldReader").finish_non_exhaustive()
    }
}

type ValidateFn = dyn Fn(&Value, &FieldReader<'_>) -> Result<ValidatorOutput, ValidationError>;

/// Shared validator closure. Two validators are equal only if they are the
/// same closure (clones of one `Validator`).
#[derive(Clone)]
pub struct Validator {
    inner: Rc<ValidateFn>,
}

thread_local! {
    static NOOP: Validator = Validator::new(|_, _| Ok(ValidatorOutput::Ready(Verdict::Valid)));
}

impl Validator {
    pub fn new(
        validate: impl Fn(&Value, &FieldReader<'_>) -> Result<ValidatorOutput, ValidationError> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(validate),
        }
    }

    /// Validator that always answers synchronously.
    pub fn from_verdict(
        validate: impl Fn(&Value, &FieldReader<'_>) -> Result<Verdict, ValidationError> + 'static,
    ) -> Self {
        Self::new(move |value, reader| validate(value, reader).map(ValidatorOutput::Ready))
    }

    /// The shared always-valid validator used when a field registers without
    /// one.
    #[must_use]
    pub fn noop() -> Self {
        NOOP.with(Clone::clone)
    }

    pub fn validate(
        &self,
        value: &Value,
        reader: &FieldReader<'_>,
    ) -> Result<ValidatorOutput, ValidationError> {
        (self.inner)(value, reader)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("ptr", &Rc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_fields(_: &Path) -> Option<Value> {
        None
    }

    #[test]
    fn verdicts_normalize_with_false_quirk() {
        assert_eq!(ErrorResult::from(Verdict::Valid), ErrorResult::Valid);
        assert_eq!(ErrorResult::from(Verdict::Invalid), ErrorResult::Messages(vec![]));
        assert_eq!(
            ErrorResult::from(Verdict::messages(["x"])),
            ErrorResult::messages(["x"])
        );
    }

    #[test]
    fn noop_is_shared() {
        assert_eq!(Validator::noop(), Validator::noop());
        assert_eq!(Validator::default(), Validator::noop());
    }

    #[test]
    fn distinct_closures_are_not_equal() {
        let a = Validator::from_verdict(|_, _| Ok(Verdict::Valid));
        let b = Validator::from_verdict(|_, _| Ok(Verdict::Valid));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn reader_reports_missing_values() {
        let reader = FieldReader::new(&no_fields);
        assert_eq!(
            reader.get("other"),
            Err(ValidationError::ValueNotThereYet {
                path: Path::from("other")
            })
        );
    }

    #[test]
    fn reader_rejects_bad_selector() {
        let reader = FieldReader::new(&no_fields);
        assert!(matches!(reader.get("a..b"), Err(ValidationError::Path(_))));
    }

    #[test]
    fn reader_resolves_builders() {
        let read = |path: &Path| (path.as_str() == "items[0]").then(|| json!(3));
        let reader = FieldReader::new(&read);
        let selector = KeySelector::from_fn(|p| p.key("items").index(0));
        assert_eq!(reader.get(selector), Ok(json!(3)));
    }

    #[test]
    fn validate_calls_closure() {
        let validator = Validator::from_verdict(|value, _| Ok(Verdict::from(value.is_string())));
        let reader = FieldReader::new(&no_fields);
        assert!(matches!(
            validator.validate(&json!("x"), &reader),
            Ok(ValidatorOutput::Ready(Verdict::Valid))
        ));
        assert!(matches!(
            validator.validate(&json!(1), &reader),
            Ok(ValidatorOutput::Ready(Verdict::Invalid))
        ));
    }
}
