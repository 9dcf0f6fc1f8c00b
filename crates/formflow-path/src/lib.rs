#![forbid(unsafe_code)]

//! Path codec for formflow.
//!
//! Form values are schema-less trees (`serde_json::Value`). Each field lives
//! at a [`Path`] such as `address.lines[1]`. This crate provides:
//!
//! - [`Path`] / [`PathSegment`]: the key type and its parsed form.
//! - [`KeySelector`] / [`PathBuilder`] / [`resolve_path`]: name a field with
//!   a literal or with a navigation closure.
//! - [`flatten`] / [`unflatten`]: convert between a tree and a path-keyed map.

pub mod error;
pub mod path;
pub mod selector;
pub mod tree;

pub use error::PathError;
pub use path::{MAX_INDEX, Path, PathSegment};
pub use selector::{KeySelector, PathBuilder, resolve_path, resolve_paths};
pub use tree::{flatten, get_in, set_in, unflatten};
