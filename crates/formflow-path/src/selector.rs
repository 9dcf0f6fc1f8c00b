#![forbid(unsafe_code)]

//! Key selectors.
//!
//! Callers name a field either with a literal path string or with a selector
//! closure that navigates a [`PathBuilder`]:
//!
//! ```
//! use formflow_path::{resolve_path, KeySelector};
//!
//! let selector = KeySelector::from_fn(|p| p.key("items").index(2).key("name"));
//! assert_eq!(resolve_path(selector).unwrap().as_str(), "items[2].name");
//! assert_eq!(resolve_path("items[2].name").unwrap().as_str(), "items[2].name");
//! ```

use std::fmt;
use std::rc::Rc;

use crate::error::{PathError, Result};
use crate::path::{MAX_INDEX, Path, PathSegment};

/// Records the navigation performed by a selector closure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathBuilder {
    segments: Vec<PathSegment>,
}

impl PathBuilder {
    /// Start at the root of the value tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Step into object key `key`.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    /// Step into array position `index`.
    #[must_use]
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    /// Segments recorded so far.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The path navigated so far. Fails if nothing was navigated.
    pub fn build(&self) -> Result<Path> {
        if self.segments.is_empty() {
            return Err(PathError::EmptySelector);
        }
        let path = Path::from_segments(&self.segments);
        let oversized = self
            .segments
            .iter()
            .any(|segment| matches!(segment, PathSegment::Index(index) if *index > MAX_INDEX));
        if oversized {
            return Err(PathError::Malformed {
                path: path.as_str().to_owned(),
                reason: "array index is too large",
            });
        }
        Ok(path)
    }
}

type SelectorFn = Rc<dyn Fn(PathBuilder) -> PathBuilder>;

/// Either a literal path or a closure that navigates to one.
#[derive(Clone)]
pub enum KeySelector {
    /// A path given as a string.
    Path(Path),
    /// A closure navigating a [`PathBuilder`].
    Builder(SelectorFn),
}

impl KeySelector {
    /// Wrap a navigation closure.
    pub fn from_fn(select: impl Fn(PathBuilder) -> PathBuilder + 'static) -> Self {
        Self::Builder(Rc::new(select))
    }
}

impl fmt::Debug for KeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Builder(_) => f.write_str("Builder(..)"),
        }
    }
}

impl From<Path> for KeySelector {
    fn from(path: Path) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for KeySelector {
    fn from(path: &Path) -> Self {
        Self::Path(path.clone())
    }
}

impl From<&str> for KeySelector {
    fn from(raw: &str) -> Self {
        Self::Path(Path::from(raw))
    }
}

impl From<String> for KeySelector {
    fn from(raw: String) -> Self {
        Self::Path(Path::from(raw))
    }
}

impl From<&String> for KeySelector {
    fn from(raw: &String) -> Self {
        Self::Path(Path::from(raw.as_str()))
    }
}

/// Turn a selector into a validated [`Path`].
///
/// A literal that does not parse is [`PathError::Malformed`]; an empty
/// literal or a closure that never navigates is [`PathError::EmptySelector`].
pub fn resolve_path(selector: impl Into<KeySelector>) -> Result<Path> {
    match selector.into() {
        KeySelector::Path(path) => {
            if path.is_empty() {
                return Err(PathError::EmptySelector);
            }
            path.segments()?;
            Ok(path)
        }
        KeySelector::Builder(select) => select(PathBuilder::new()).build(),
    }
}

/// Resolve several selectors at once, failing on the first bad one.
pub fn resolve_paths<I>(selectors: I) -> Result<Vec<Path>>
where
    I: IntoIterator,
    I::Item: Into<KeySelector>,
{
    selectors.into_iter().map(resolve_path).collect()
}
