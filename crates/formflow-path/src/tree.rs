#![forbid(unsafe_code)]

//! Conversions between a value tree and a path-keyed map.
//!
//! [`flatten`] walks a tree depth first and records one entry per leaf.
//! Scalars, `null`, and empty containers are leaves; non-empty objects and
//! arrays are descended. [`unflatten`] rebuilds the tree from such a map.
//!
//! For any object tree whose keys contain neither `.` nor `[`,
//! `unflatten(&flatten(&tree)?)? == tree`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{PathError, Result};
use crate::path::{Path, PathSegment};

/// Flatten `tree` into `path -> leaf value`.
///
/// `null` flattens to an empty map. A scalar root is rejected.
pub fn flatten(tree: &Value) -> Result<BTreeMap<Path, Value>> {
    let mut out = BTreeMap::new();
    match tree {
        Value::Null => {}
        Value::Object(map) if map.is_empty() => {}
        Value::Array(items) if items.is_empty() => {}
        Value::Object(_) | Value::Array(_) => walk(&Path::default(), tree, &mut out),
        other => {
            return Err(PathError::NotAnObject {
                found: kind(other),
            });
        }
    }
    Ok(out)
}

fn walk(prefix: &Path, node: &Value, out: &mut BTreeMap<Path, Value>) {
    match node {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                walk(&prefix.join_key(key), child, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                walk(&prefix.join_index(index), child, out);
            }
        }
        leaf => {
            out.insert(prefix.clone(), leaf.clone());
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Rebuild a tree from `path -> value` entries.
///
/// Missing array positions become `null`. When a path needs a container
/// where an earlier entry stored a scalar, the container replaces it.
pub fn unflatten<'a, I>(entries: I) -> Result<Value>
where
    I: IntoIterator<Item = (&'a Path, &'a Value)>,
{
    let mut root = Value::Object(Map::new());
    for (path, value) in entries {
        let segments = path.segments()?;
        insert(&mut root, &segments, value.clone());
    }
    Ok(root)
}

/// Store `value` at `path` inside `tree`, creating containers on the way.
pub fn set_in(tree: &mut Value, path: &Path, value: Value) -> Result<()> {
    let segments = path.segments()?;
    insert(tree, &segments, value);
    Ok(())
}

/// Look up the value stored at `path`.
#[must_use]
pub fn get_in<'a>(tree: &'a Value, path: &Path) -> Option<&'a Value> {
    let segments = path.segments().ok()?;
    segments
        .iter()
        .try_fold(tree, |node, segment| match segment {
            PathSegment::Key(key) => node.get(key.as_str()),
            PathSegment::Index(index) => node.get(*index),
        })
}

fn insert(slot: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = value;
        return;
    };
    match head {
        PathSegment::Key(key) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(map) = slot {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                insert(child, rest, value);
            }
        }
        PathSegment::Index(index) => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                let Some(len) = index.checked_add(1) else {
                    return;
                };
                if items.len() < len {
                    items.resize(len, Value::Null);
                }
                insert(&mut items[*index], rest, value);
            }
        }
    }
}
