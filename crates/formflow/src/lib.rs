#![forbid(unsafe_code)]

//! Reactive form state.
//!
//! A [`FormRegistry`] tracks the fields of one form. Each registered field
//! has a value cell, an initial-value cell and a control-state cell
//! (touched flag, validator, manual error channel, combined error cell).
//! Validators read other fields through a [`FieldReader`]; every field they
//! read becomes a dependency, so changing it re-validates automatically.
//!
//! ```
//! use formflow::{ControlOptions, FormRegistry, RegistryOptions, commands};
//! use formflow::validators::is_at_most;
//! use serde_json::json;
//!
//! let form = FormRegistry::new(
//!     RegistryOptions::default().with_initial_value(json!({ "min": 12, "max": 10 })),
//! )?;
//! form.register_control(ControlOptions::new("max"))?;
//! form.register_control(ControlOptions::new("min").with_validator(is_at_most("max")))?;
//! assert_eq!(commands::is_valid(&form), formflow::Validity::Invalid);
//!
//! commands::set_field_value(&form, "max", json!(15))?;
//! assert_eq!(commands::is_valid(&form), formflow::Validity::Valid);
//! # Ok::<(), formflow::FormError>(())
//! ```
//!
//! # Modules
//!
//! - [`registry`]: registration, field lookup, disposal.
//! - [`commands`]: one-shot reads and writes.
//! - [`aggregate`]: live views across fields (errors, validity, pristine).
//! - [`validators`]: numeric and required-value validators, combinators.
//!
//! # Asynchronous validators
//!
//! A validator may answer with a future. The field reports
//! [`ErrorResult::Pending`] until the host drives the registry's queue with
//! [`FormRegistry::run_until_stalled`] or awaits [`FormRegistry::settle`].
//! Results of superseded runs are dropped.
//!
//! # Logging
//!
//! Diagnostics go through `tracing`. Reading a field that has no value yet
//! is a `warn`; a failing validator is an `error`. The crate never installs
//! a subscriber.

pub mod aggregate;
pub mod commands;
pub mod config;
pub mod control;
pub mod error;
pub mod outcome;
mod pending;
pub mod registry;
mod validation;
pub mod validator;
pub mod validators;

pub use aggregate::{ErrorFilter, KeyScope};
pub use commands::FieldChange;
pub use config::RegistryOptions;
pub use control::{ControlOptions, ControlState, Field};
pub use error::{FormError, Result, ValidationError};
pub use outcome::{ErrorResult, Validity, combine_errors};
pub use registry::{FormRegistry, create_registry};
pub use validator::{DeferredVerdict, FieldReader, Validator, ValidatorOutput, Verdict};

pub use formflow_path::{KeySelector, Path, PathBuilder, PathError};
pub use formflow_reactive::{DerivedState, EventChannel, State, Subscription};
