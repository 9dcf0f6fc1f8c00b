#![forbid(unsafe_code)]

//! Field paths.
//!
//! A [`Path`] names one location in a form value tree: object keys are joined
//! with `.` and array positions are written as `[n]`, so `items[2].name` is
//! the `name` key of the third element of `items`.
//!
//! Paths are opaque strings for equality, ordering and hashing. Parsing into
//! [`PathSegment`]s only happens when a tree is rebuilt or a path is
//! validated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PathError, Result};

/// Largest array position a path may name. Rebuilding a tree fills every
/// position below an index with `null`, so larger indices are rejected.
pub const MAX_INDEX: usize = 1 << 20;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An object key.
    Key(String),
    /// An array position.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// String key identifying a field's location in the value tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(String);

impl Path {
    /// Wrap `raw` without validating it.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Wrap `raw`, rejecting strings that do not parse.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let path = Self(raw.into());
        path.segments()?;
        Ok(path)
    }

    /// Render `segments` back into the `a.b[0]` form.
    #[must_use]
    pub fn from_segments(segments: &[PathSegment]) -> Self {
        let mut raw = String::new();
        for segment in segments {
            if matches!(segment, PathSegment::Key(_)) && !raw.is_empty() {
                raw.push('.');
            }
            raw.push_str(&segment.to_string());
        }
        Self(raw)
    }

    /// The raw path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the path is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of the key `key` below this one.
    #[must_use]
    pub fn join_key(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self(key.to_owned())
        } else {
            Self(format!("{}.{key}", self.0))
        }
    }

    /// Path of the array element `index` below this one.
    #[must_use]
    pub fn join_index(&self, index: usize) -> Self {
        Self(format!("{}[{index}]", self.0))
    }

    /// Whether `other` lies strictly below this path, e.g. `a` is an
    /// ancestor of `a.b` and `a[0]` but not of `ab` or of itself.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        if self.0.is_empty() {
            return !other.0.is_empty();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0[self.0.len()..].starts_with(['.', '['])
    }

    /// Parse the path into its segments.
    pub fn segments(&self) -> Result<Vec<PathSegment>> {
        parse_segments(&self.0)
    }
}

fn malformed(path: &str, reason: &'static str) -> PathError {
    PathError::Malformed {
        path: path.to_owned(),
        reason,
    }
}

fn parse_segments(raw: &str) -> Result<Vec<PathSegment>> {
    if raw.is_empty() {
        return Err(malformed(raw, "path is empty"));
    }
    let mut segments = Vec::new();
    let mut rest = raw;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let end = after
                .find(']')
                .ok_or_else(|| malformed(raw, "unclosed `[`"))?;
            let index = after[..end]
                .parse::<usize>()
                .map_err(|_| malformed(raw, "array index is not a non-negative integer"))?;
            if index > MAX_INDEX {
                return Err(malformed(raw, "array index is too large"));
            }
            segments.push(PathSegment::Index(index));
            rest = &after[end + 1..];
            continue;
        }

        let body = if segments.is_empty() {
            rest
        } else {
            rest.strip_prefix('.')
                .ok_or_else(|| malformed(raw, "expected `.` or `[` between segments"))?
        };
        let end = body.find(['.', '[']).unwrap_or(body.len());
        let key = &body[..end];
        if key.is_empty() {
            return Err(malformed(raw, "empty key"));
        }
        if key.contains(']') {
            return Err(malformed(raw, "unexpected `]`"));
        }
        segments.push(PathSegment::Key(key.to_owned()));
        rest = &body[end..];
    }
    Ok(segments)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Path {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Path {
    fn borrow(&self) -> &str {
        &self.0
    }
}
