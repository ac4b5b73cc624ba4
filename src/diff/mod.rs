//! Structural diff between two JSON trees.
//!
//! Produces an ordered list of add/remove/replace operations addressed by
//! JSON Pointer. Applying the operations in order to the old tree yields the
//! new one. Arrays are compared by position; moves are not detected, so an
//! insertion at the front of a list shows up as replacements over the tail
//! plus one trailing add.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;

/// Patch operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

/// One edit in a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOperation {
    pub op: PatchOp,
    /// JSON Pointer into the tree
    pub path: String,
    /// New value for add/replace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Previous value for replace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_value: Option<Value>,
}

impl PatchOperation {
    fn add(path: String, value: &Value) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value.clone()),
            from_value: None,
        }
    }

    fn remove(path: String) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
            from_value: None,
        }
    }

    fn replace(path: String, old: &Value, new: &Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(new.clone()),
            from_value: Some(old.clone()),
        }
    }
}

/// Diff two serializable values.
pub fn diff_serialized<T: Serialize>(old: &T, new: &T) -> Result<Vec<PatchOperation>, AppError> {
    let old = serde_json::to_value(old)?;
    let new = serde_json::to_value(new)?;
    let patch = diff(&old, &new);
    tracing::debug!("Generated diff with {} operations", patch.len());
    Ok(patch)
}

/// Compute the operations that turn `old` into `new`.
pub fn diff(old: &Value, new: &Value) -> Vec<PatchOperation> {
    let mut patch = Vec::new();
    diff_at(&mut String::new(), old, new, &mut patch);
    patch
}

fn diff_at(path: &mut String, old: &Value, new: &Value, patch: &mut Vec<PatchOperation>) {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => diff_objects(path, old, new, patch),
        (Value::Array(old), Value::Array(new)) => diff_arrays(path, old, new, patch),
        _ if old == new => {}
        _ => patch.push(PatchOperation::replace(path.clone(), old, new)),
    }
}

fn diff_objects(
    path: &mut String,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    patch: &mut Vec<PatchOperation>,
) {
    for (key, old_value) in old {
        let len = path.len();
        push_segment(path, key);
        match new.get(key) {
            Some(new_value) => diff_at(path, old_value, new_value, patch),
            None => patch.push(PatchOperation::remove(path.clone())),
        }
        path.truncate(len);
    }

    for (key, new_value) in new {
        if !old.contains_key(key) {
            let len = path.len();
            push_segment(path, key);
            patch.push(PatchOperation::add(path.clone(), new_value));
            path.truncate(len);
        }
    }
}

fn diff_arrays(path: &mut String, old: &[Value], new: &[Value], patch: &mut Vec<PatchOperation>) {
    let common = old.len().min(new.len());

    for index in 0..common {
        let len = path.len();
        push_index(path, index);
        diff_at(path, &old[index], &new[index], patch);
        path.truncate(len);
    }

    // Highest index first so each removal leaves earlier indices intact.
    for index in (common..old.len()).rev() {
        let len = path.len();
        push_index(path, index);
        patch.push(PatchOperation::remove(path.clone()));
        path.truncate(len);
    }

    for (index, value) in new.iter().enumerate().skip(common) {
        let len = path.len();
        push_index(path, index);
        patch.push(PatchOperation::add(path.clone(), value));
        path.truncate(len);
    }
}

fn push_segment(path: &mut String, key: &str) {
    path.push('/');
    for c in key.chars() {
        match c {
            '~' => path.push_str("~0"),
            '/' => path.push_str("~1"),
            _ => path.push(c),
        }
    }
}

fn push_index(path: &mut String, index: usize) {
    path.push('/');
    path.push_str(&index.to_string());
}
