//! Local replica of a channel's session document.

use serde_json::{Map, Value};

use super::patch::{apply_patch, lookup, parse_pointer, Patch};
use crate::error::SyncError;

/// The JSON document replicated over one channel.
///
/// Mutated only by the owning channel actor in response to coordinator
/// frames. Every read returns an owned copy.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDocument {
    value: Value,
}

impl Default for SessionDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl SessionDocument {
    pub fn empty() -> Self {
        Self {
            value: Value::Object(Map::new()),
        }
    }

    pub fn from_value(value: Value) -> Self {
        Self { value }
    }

    pub fn clear(&mut self) {
        self.value = Value::Object(Map::new());
    }

    /// Replaces the whole document; `Value::Null` clears it.
    pub fn replace_all(&mut self, value: Value) {
        if value.is_null() {
            self.clear();
        } else {
            self.value = value;
        }
    }

    /// Applies an incoming patch list.
    ///
    /// A list whose first element is `{op: remove, path: "/"}` resets the
    /// document to `{}` and the rest of the list is ignored. Any other list
    /// is applied atomically: if one operation fails, the document is left
    /// untouched.
    pub fn apply(&mut self, patches: &[Patch]) -> Result<(), SyncError> {
        let Some(first) = patches.first() else {
            return Ok(());
        };
        if first.is_root_remove() {
            self.clear();
            return Ok(());
        }

        let mut next = self.value.clone();
        for (index, patch) in patches.iter().enumerate() {
            if patch.is_root_remove() {
                tracing::warn!(
                    index,
                    "Root remove after the first patch applied as a plain remove of key \"\""
                );
            }
            apply_patch(&mut next, patch)?;
        }
        self.value = next;
        Ok(())
    }

    /// Copy of the whole document.
    pub fn get_all(&self) -> Value {
        self.value.clone()
    }

    /// Copy of a first-level field.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.value.get(name).cloned()
    }

    /// Copy of the value at a JSON pointer.
    pub fn find(&self, path: &str) -> Result<Option<Value>, SyncError> {
        let tokens = parse_pointer(path)?;
        Ok(lookup(&self.value, &tokens).cloned())
    }

    /// Whether the value at `path` deep-equals `expected`.
    pub fn test(&self, path: &str, expected: &Value) -> Result<bool, SyncError> {
        let tokens = parse_pointer(path)?;
        Ok(lookup(&self.value, &tokens) == Some(expected))
    }

    pub fn defined(&self, path: &str) -> Result<bool, SyncError> {
        let tokens = parse_pointer(path)?;
        Ok(lookup(&self.value, &tokens).is_some())
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_remove_first_clears_regardless_of_rest() {
        let mut doc = SessionDocument::from_value(json!({"a": 1, "b": [1, 2]}));
        doc.apply(&[
            Patch::remove("/"),
            Patch::add("/c", json!(3)),
            Patch::remove("/does/not/exist"),
        ])
        .unwrap();
        assert_eq!(doc.get_all(), json!({}));
    }

    #[test]
    fn test_root_remove_later_is_plain_remove() {
        let mut doc = SessionDocument::from_value(json!({"": 1, "a": 2}));
        doc.apply(&[Patch::add("/b", json!(3)), Patch::remove("/")])
            .unwrap();
        assert_eq!(doc.get_all(), json!({"a": 2, "b": 3}));
    }

    #[test]
    fn test_failed_list_leaves_document_untouched() {
        let mut doc = SessionDocument::from_value(json!({"a": 1}));
        let result = doc.apply(&[Patch::add("/b", json!(2)), Patch::remove("/missing")]);
        assert!(matches!(result, Err(SyncError::Protocol(_))));
        assert_eq!(doc.get_all(), json!({"a": 1}));
    }

    #[test]
    fn test_empty_list_is_noop() {
        let mut doc = SessionDocument::from_value(json!({"a": 1}));
        doc.apply(&[]).unwrap();
        assert_eq!(doc.get_all(), json!({"a": 1}));
    }

    #[test]
    fn test_replace_all_null_clears() {
        let mut doc = SessionDocument::empty();
        doc.replace_all(json!({"x": true}));
        assert_eq!(doc.get("x"), Some(json!(true)));
        doc.replace_all(Value::Null);
        assert_eq!(doc.get_all(), json!({}));
    }

    #[test]
    fn test_reads_return_independent_copies() {
        let doc = SessionDocument::from_value(json!({"list": [1, 2]}));
        let mut copy = doc.get("list").unwrap();
        copy.as_array_mut().unwrap().push(json!(3));
        assert_eq!(doc.get("list"), Some(json!([1, 2])));
    }

    #[test]
    fn test_find_test_defined() {
        let doc = SessionDocument::from_value(json!({"a": {"b~c": [false]}}));
        assert_eq!(doc.find("/a/b~0c/0").unwrap(), Some(json!(false)));
        assert!(doc.test("/a", &json!({"b~c": [false]})).unwrap());
        assert!(!doc.test("/a/b~0c/0", &json!(true)).unwrap());
        assert!(doc.defined("/a/b~0c").unwrap());
        assert!(!doc.defined("/z").unwrap());
        assert!(doc.find("bad").is_err());
    }
}
