//! The configuration tree: a nested JSON-shaped mapping addressed by dotted
//! paths such as `aws.bedrock.anthropic.model_id`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AppError;

/// Deep-merge two values.
/// Mappings are merged recursively; the overlay only needs to specify keys
/// that differ from the base. For every other type (string, number, array, …)
/// the overlay value replaces the base value wholesale, even when that
/// changes the type at that key.
pub fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, ov_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_values(base_val, ov_val),
                    None => ov_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Layered key-value store behind every configuration lookup.
///
/// The root is always a mapping. Reads never fail: a missing path resolves
/// to the caller's default. Writes create intermediate mappings on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStore {
    root: Map<String, Value>,
}

impl ConfigStore {
    /// An empty tree. Use [`ConfigStore::load`] for the layered production tree.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(root: Map<String, Value>) -> Self {
        Self { root }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Look up the value at a dotted path.
    ///
    /// Returns `None` as soon as a segment is missing or an intermediate
    /// value is not a mapping.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Typed lookup with a fallback.
    ///
    /// `default` is returned when the path is missing or when the stored
    /// value does not deserialize as `T`.
    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        let Some(value) = self.get(path) else {
            return default;
        };
        match T::deserialize(value) {
            Ok(v) => v,
            Err(e) => {
                debug!(path, error = %e, "config value has unexpected type, using default");
                default
            }
        }
    }

    /// Assign `value` at a dotted path, creating empty mappings for missing
    /// intermediate segments.
    ///
    /// Fails with [`AppError::PathConflict`] when an intermediate segment
    /// already holds a non-mapping value; the tree is left unchanged.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), AppError> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(AppError::Config("empty config path".into()));
        };

        let mut node = &mut self.root;
        for segment in parents {
            let child = node
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = match child {
                Value::Object(map) => map,
                _ => {
                    return Err(AppError::PathConflict {
                        path: path.to_string(),
                        segment: (*segment).to_string(),
                    });
                }
            };
        }
        node.insert((*last).to_string(), value.into());
        Ok(())
    }

    /// Deep-merge `overlay` into the tree; overlay values win.
    pub fn merge(&mut self, overlay: Map<String, Value>) {
        let base = std::mem::take(&mut self.root);
        if let Value::Object(merged) = merge_values(Value::Object(base), Value::Object(overlay)) {
            self.root = merged;
        }
    }
}

impl From<ConfigStore> for Value {
    fn from(store: ConfigStore) -> Self {
        Value::Object(store.root)
    }
}
