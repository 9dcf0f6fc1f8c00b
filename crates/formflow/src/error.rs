#![forbid(unsafe_code)]

use formflow_path::{Path, PathError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormError>;

/// Failures raised while a validator runs.
///
/// None of these escape the registry: the engine logs them and reports the
/// field as pending.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The validator read a field that has no value yet.
    #[error("field `{path}` doesn't have any value yet")]
    ValueNotThereYet { path: Path },

    /// The validator named a field with an invalid selector.
    #[error("invalid field selector: {0}")]
    Path(#[from] PathError),

    /// The validator itself failed.
    #[error("validator failed: {message}")]
    Failed { message: String },
}

impl ValidationError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Failures of registry operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("field not registered: {path}")]
    FieldNotRegistered { path: Path },

    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    #[error("form registry has been disposed")]
    Disposed,
}

impl FormError {
    #[must_use]
    pub fn not_registered(path: &Path) -> Self {
        Self::FieldNotRegistered { path: path.clone() }
    }
}
