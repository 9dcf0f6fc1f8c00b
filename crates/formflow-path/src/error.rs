#![forbid(unsafe_code)]

//! Error types for path handling.

use thiserror::Error;

/// Errors raised while resolving, parsing, or applying paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A selector produced no path: it never navigated into the value.
    #[error("selector must navigate to at least one field")]
    EmptySelector,

    /// A path string does not follow the `a.b[0].c` grammar.
    #[error("malformed path `{path}`: {reason}")]
    Malformed { path: String, reason: &'static str },

    /// A tree passed to `flatten` is a scalar rather than an object or array.
    #[error("form value must be an object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Result type for path operations.
pub type Result<T> = std::result::Result<T, PathError>;
