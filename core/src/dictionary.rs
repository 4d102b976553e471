//! Locale dictionaries and their flat dotted-path representation.
//!
//! A dictionary is a tree of string leaves. Flattening binds every leaf to the
//! dotted path of its ancestors (`common.error`), and unflattening rebuilds the
//! tree from those paths. Key order is preserved in both directions so files
//! rewritten by the sync keep the layout their authors gave them.
//!
//! Key segments must not contain [`KEY_SEPARATOR`]; such keys are rejected
//! instead of being silently mis-flattened. Objects without any leaves carry no
//! translatable content and do not survive a flatten/unflatten round trip.

use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

pub const KEY_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DictionaryError {
    #[error("locale root must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("unsupported {kind} value at `{path}`: only strings and objects are allowed")]
    UnsupportedValue { path: String, kind: &'static str },
    #[error("key `{path}` contains the path separator `.`")]
    SeparatorInKey { path: String },
    #[error("key path `{path}` passes through an existing string value")]
    PathConflict { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(String),
    Object(Dictionary),
}

/// Ordered mapping from key names to nested nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: Vec<(String, Node)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.position(key).map(|pos| &self.entries[pos].1)
    }

    /// Inserts or replaces `key`, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, node: Node) {
        let key = key.into();
        match self.position(&key) {
            Some(pos) => self.entries[pos].1 = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    pub fn from_value(value: &Value) -> Result<Self, DictionaryError> {
        match value {
            Value::Object(map) => Self::from_map(map, ""),
            other => Err(DictionaryError::NotAnObject(value_kind(other))),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.entries.len());
        for (key, node) in &self.entries {
            let value = match node {
                Node::Leaf(text) => Value::String(text.clone()),
                Node::Object(child) => child.to_value(),
            };
            map.insert(key.clone(), value);
        }
        Value::Object(map)
    }

    fn from_map(map: &Map<String, Value>, prefix: &str) -> Result<Self, DictionaryError> {
        let mut dict = Dictionary::new();
        for (key, value) in map {
            let path = join_path(prefix, key);
            let node = match value {
                Value::String(text) => Node::Leaf(text.clone()),
                Value::Object(child) => Node::Object(Self::from_map(child, &path)?),
                other => {
                    return Err(DictionaryError::UnsupportedValue {
                        path,
                        kind: value_kind(other),
                    })
                }
            };
            dict.entries.push((key.clone(), node));
        }
        Ok(dict)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(existing, _)| existing == key)
    }

    /// Returns the child object at `key`, creating it when absent. `None` when
    /// `key` already holds a leaf.
    fn child_object_mut(&mut self, key: &str) -> Option<&mut Dictionary> {
        let pos = match self.position(key) {
            Some(pos) => pos,
            None => {
                self.entries
                    .push((key.to_string(), Node::Object(Dictionary::new())));
                self.entries.len() - 1
            }
        };
        match &mut self.entries[pos].1 {
            Node::Object(child) => Some(child),
            Node::Leaf(_) => None,
        }
    }
}

/// Single-level view of a dictionary keyed by dotted paths.
///
/// Iteration follows insertion order, which for a flattened dictionary is the
/// depth-first order of the file it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl FlatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.index
            .get(path)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    pub fn contains_key(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Sets `path` to `value`, returning the previous value if there was one.
    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let path = path.into();
        let value = value.into();
        match self.index.get(&path) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, value)),
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push((path, value));
                None
            }
        }
    }

    /// Keeps only the entries for which `keep` returns true and returns the
    /// removed paths in their original order.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (path, value) in self.entries.drain(..) {
            if keep(&path, &value) {
                kept.push((path, value));
            } else {
                removed.push(path);
            }
        }
        self.entries = kept;
        if !removed.is_empty() {
            self.reindex();
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(path, value)| (path.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, (path, _))| (path.clone(), pos))
            .collect();
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut flat = FlatMap::new();
        for (path, value) in iter {
            flat.insert(path, value);
        }
        flat
    }
}

pub fn flatten(dict: &Dictionary) -> Result<FlatMap, DictionaryError> {
    let mut flat = FlatMap::new();
    flatten_into(dict, "", &mut flat)?;
    Ok(flat)
}

fn flatten_into(dict: &Dictionary, prefix: &str, out: &mut FlatMap) -> Result<(), DictionaryError> {
    for (key, node) in dict.iter() {
        let path = join_path(prefix, key);
        if key.contains(KEY_SEPARATOR) {
            return Err(DictionaryError::SeparatorInKey { path });
        }
        match node {
            Node::Leaf(text) => {
                out.insert(path, text.as_str());
            }
            Node::Object(child) => flatten_into(child, &path, out)?,
        }
    }
    Ok(())
}

pub fn unflatten(flat: &FlatMap) -> Result<Dictionary, DictionaryError> {
    let mut root = Dictionary::new();
    for (path, value) in flat.iter() {
        let (parents, leaf) = match path.rsplit_once(KEY_SEPARATOR) {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, path),
        };

        let mut cursor = &mut root;
        if let Some(parents) = parents {
            for segment in parents.split(KEY_SEPARATOR) {
                cursor = cursor
                    .child_object_mut(segment)
                    .ok_or_else(|| DictionaryError::PathConflict {
                        path: path.to_string(),
                    })?;
            }
        }

        if let Some(Node::Object(_)) = cursor.get(leaf) {
            return Err(DictionaryError::PathConflict {
                path: path.to_string(),
            });
        }
        cursor.insert(leaf, Node::Leaf(value.to_string()));
    }
    Ok(root)
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{KEY_SEPARATOR}{key}")
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dict(value: Value) -> Dictionary {
        Dictionary::from_value(&value).unwrap()
    }

    #[test]
    fn flattens_nested_objects_into_dotted_paths() {
        let source = dict(json!({
            "common": { "error": "Oops", "actions": { "save": "Save" } },
            "title": "Dashboard"
        }));

        let flat = flatten(&source).unwrap();
        let pairs: Vec<_> = flat.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("common.error", "Oops"),
                ("common.actions.save", "Save"),
                ("title", "Dashboard"),
            ]
        );
    }

    #[test]
    fn round_trips_nested_dictionary() {
        let source = dict(json!({
            "nav": { "home": "Home", "reports": { "daily": "Daily", "weekly": "Weekly" } },
            "footer": "All rights reserved",
            "auth": { "login": "Log in" }
        }));

        let rebuilt = unflatten(&flatten(&source).unwrap()).unwrap();
        assert_eq!(rebuilt, source);
        assert_eq!(rebuilt.to_value(), source.to_value());
    }

    #[test]
    fn unflattens_single_segment_paths() {
        let flat: FlatMap = [("greeting", "Hi"), ("farewell", "Bye")].into_iter().collect();
        let rebuilt = unflatten(&flat).unwrap();
        assert_eq!(rebuilt.to_value(), json!({ "greeting": "Hi", "farewell": "Bye" }));
    }

    #[test]
    fn rejects_array_values() {
        let err = Dictionary::from_value(&json!({ "menu": { "items": ["a", "b"] } })).unwrap_err();
        assert_eq!(
            err,
            DictionaryError::UnsupportedValue {
                path: "menu.items".into(),
                kind: "array"
            }
        );
    }

    #[test]
    fn rejects_non_object_root() {
        let err = Dictionary::from_value(&json!("text")).unwrap_err();
        assert_eq!(err, DictionaryError::NotAnObject("string"));
    }

    #[test]
    fn rejects_keys_containing_separator() {
        let source = dict(json!({ "links": { "example.com": "Example" } }));
        let err = flatten(&source).unwrap_err();
        assert_eq!(
            err,
            DictionaryError::SeparatorInKey {
                path: "links.example.com".into()
            }
        );
    }

    #[test]
    fn conflicting_paths_are_reported() {
        let flat: FlatMap = [("a", "leaf"), ("a.b", "nested")].into_iter().collect();
        assert!(matches!(
            unflatten(&flat),
            Err(DictionaryError::PathConflict { path }) if path == "a.b"
        ));

        let flat: FlatMap = [("a.b", "nested"), ("a", "leaf")].into_iter().collect();
        assert!(matches!(
            unflatten(&flat),
            Err(DictionaryError::PathConflict { path }) if path == "a"
        ));
    }

    #[test]
    fn retain_reports_removed_paths_and_keeps_lookup_consistent() {
        let mut flat: FlatMap = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        let removed = flat.retain(|path, _| path != "b");
        assert_eq!(removed, vec!["b".to_string()]);
        assert_eq!(flat.get("c"), Some("3"));
        assert!(!flat.contains_key("b"));
        assert_eq!(flat.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut flat: FlatMap = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(flat.insert("a", "one"), Some("1".to_string()));
        assert_eq!(flat.iter().collect::<Vec<_>>(), vec![("a", "one"), ("b", "2")]);
    }
}
