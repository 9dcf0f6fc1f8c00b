#![forbid(unsafe_code)]

//! Registry configuration.
//!
//! Options are plain data: build them in code with the `with_*` methods or
//! deserialize them from JSON supplied by the host.
//!
//! ```
//! use formflow::RegistryOptions;
//! use serde_json::json;
//!
//! let options = RegistryOptions::default()
//!     .with_initial_value(json!({ "name": "Ada" }))
//!     .with_default_touched(false);
//! assert!(options.initial_value.is_some());
//!
//! let parsed: RegistryOptions =
//!     serde_json::from_str(r#"{ "initial_value": { "age": 3 } }"#).unwrap();
//! assert!(!parsed.default_touched);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Options accepted by [`FormRegistry::new`](crate::FormRegistry::new).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    /// Form-level initial tree. Flattened into both the initial values and
    /// the current values when the registry is created.
    pub initial_value: Option<Value>,

    /// Touched state restored by `reset_form` / `reset_field`.
    pub default_touched: bool,
}

impl RegistryOptions {
    #[must_use]
    pub fn with_initial_value(mut self, value: Value) -> Self {
        self.initial_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_default_touched(mut self, touched: bool) -> Self {
        self.default_touched = touched;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_empty() {
        let options = RegistryOptions::default();
        assert_eq!(options.initial_value, None);
        assert!(!options.default_touched);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let options: RegistryOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, RegistryOptions::default());
    }

    #[test]
    fn round_trips_through_json() {
        let options = RegistryOptions::default()
            .with_initial_value(json!({ "a": [1, 2] }))
            .with_default_touched(true);
        let text = serde_json::to_string(&options).unwrap();
        let back: RegistryOptions = serde_json::from_str(&text).unwrap();
        assert_eq!(back, options);
    }
}
