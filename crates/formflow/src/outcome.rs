#![forbid(unsafe_code)]

//! Validation outcomes and how they combine.
//!
//! An [`ErrorResult`] is what a field reports: no error, a list of messages,
//! or pending while an asynchronous validator is in flight. In JSON it has
//! the shapes `false`, `["..."]` and `"pending"`.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Validation outcome of one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorResult {
    /// No error.
    #[default]
    Valid,
    /// Concrete error, possibly without any message.
    Messages(Vec<String>),
    /// Validation still resolving.
    Pending,
}

impl ErrorResult {
    /// Shorthand for a message list.
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

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether this is a concrete message list (even an empty one).
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Messages(_))
    }
}

/// Merge a field's validator result with its manual override.
///
/// The manual result only matters when it is a message list. It then wins
/// outright over `Valid`/`Pending`, or is prepended to the validator's
/// messages.
#[must_use]
pub fn combine_errors(validator: &ErrorResult, manual: &ErrorResult) -> ErrorResult {
    match (manual, validator) {
        (ErrorResult::Valid | ErrorResult::Pending, _) => validator.clone(),
        (ErrorResult::Messages(_), ErrorResult::Valid | ErrorResult::Pending) => manual.clone(),
        (ErrorResult::Messages(manual), ErrorResult::Messages(found)) => {
            ErrorResult::Messages(manual.iter().chain(found).cloned().collect())
        }
    }
}

/// Overall validity of a set of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validity {
    Valid,
    Invalid,
    Pending,
}

impl Validity {
    /// Reduce per-field results: any error makes the whole set invalid,
    /// otherwise any pending field makes it pending.
    pub fn reduce<'a>(results: impl IntoIterator<Item = &'a ErrorResult>) -> Self {
        let mut pending = false;
        for result in results {
            match result {
                ErrorResult::Messages(_) => return Self::Invalid,
                ErrorResult::Pending => pending = true,
                ErrorResult::Valid => {}
            }
        }
        if pending { Self::Pending } else { Self::Valid }
    }
}

impl Serialize for Validity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Valid => serializer.serialize_bool(true),
            Self::Invalid => serializer.serialize_bool(false),
            Self::Pending => serializer.serialize_str("pending"),
        }
    }
}

impl Serialize for ErrorResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Valid => serializer.serialize_bool(false),
            Self::Messages(messages) => messages.serialize(serializer),
            Self::Pending => serializer.serialize_str("pending"),
        }
    }
}

struct ErrorResultVisitor;

impl<'de> Visitor<'de> for ErrorResultVisitor {
    type Value = ErrorResult;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("`false`, a list of messages, or \"pending\"")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ErrorResult, E> {
        if v {
            Err(E::invalid_value(de::Unexpected::Bool(true), &self))
        } else {
            Ok(ErrorResult::Valid)
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ErrorResult, E> {
        if v == "pending" {
            Ok(ErrorResult::Pending)
        } else {
            Err(E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<ErrorResult, A::Error> {
        let mut messages = Vec::new();
        while let Some(message) = seq.next_element::<String>()? {
            messages.push(message);
        }
        Ok(ErrorResult::Messages(messages))
    }
}

impl<'de> Deserialize<'de> for ErrorResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ErrorResultVisitor)
    }
}
