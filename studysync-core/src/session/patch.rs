//! JSON-Patch operations and JSON-Pointer addressing.
//!
//! Pointers follow RFC 6901: `""` is the whole document, `"/a/b"` walks keys
//! (or array indices), and `~1` / `~0` escape `/` and `~` inside a token.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Kind of a patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
    Copy,
    Move,
    Test,
}

impl PatchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
            PatchOp::Copy => "copy",
            PatchOp::Move => "move",
            PatchOp::Test => "test",
        }
    }
}

impl std::fmt::Display for PatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One JSON-Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: String,
    /// Operand of add/replace/test; `Some(Value::Null)` is a real null
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    /// Source pointer of copy/move
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Patch {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::with_value(PatchOp::Add, path, value)
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
            from: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self::with_value(PatchOp::Replace, path, value)
    }

    pub fn copy(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_from(PatchOp::Copy, from, path)
    }

    pub fn move_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_from(PatchOp::Move, from, path)
    }

    pub fn test(path: impl Into<String>, value: Value) -> Self {
        Self::with_value(PatchOp::Test, path, value)
    }

    /// `{op: remove, path: "/"}`, the coordinator's "clear everything" marker.
    pub fn is_root_remove(&self) -> bool {
        self.op == PatchOp::Remove && self.path == "/"
    }

    fn with_value(op: PatchOp, path: impl Into<String>, value: Value) -> Self {
        Self {
            op,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    fn with_from(op: PatchOp, from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            value: None,
            from: Some(from.into()),
        }
    }
}

/// Deserializes a field so that an explicit `null` becomes `Some(Value::Null)`.
/// Combined with `#[serde(default)]`, a missing field stays `None`.
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Escapes a key so it can be used as a single pointer token.
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Builds the pointer addressing a first-level key.
pub fn pointer_for_key(name: &str) -> String {
    format!("/{}", escape_token(name))
}

/// Splits a pointer into its unescaped tokens.
pub fn parse_pointer(path: &str) -> Result<Vec<String>, SyncError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| SyncError::Protocol(format!("Invalid JSON pointer: {}", path)))?;
    Ok(rest.split('/').map(unescape_token).collect())
}

fn array_index(token: &str, len: usize, allow_end: bool) -> Option<usize> {
    if allow_end && token == "-" {
        return Some(len);
    }
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return None;
    }
    let index: usize = token.parse().ok()?;
    let limit = if allow_end { len } else { len.saturating_sub(1) };
    if len == 0 && !allow_end {
        return None;
    }
    (index <= limit).then_some(index)
}

/// Looks up the value at `tokens`.
pub fn lookup<'a>(value: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    tokens.iter().try_fold(value, |current, token| match current {
        Value::Object(map) => map.get(token),
        Value::Array(items) => array_index(token, items.len(), false).and_then(|i| items.get(i)),
        _ => None,
    })
}

fn lookup_mut<'a>(value: &'a mut Value, tokens: &[String]) -> Option<&'a mut Value> {
    tokens.iter().try_fold(value, |current, token| match current {
        Value::Object(map) => map.get_mut(token),
        Value::Array(items) => {
            let len = items.len();
            array_index(token, len, false).and_then(move |i| items.get_mut(i))
        }
        _ => None,
    })
}

fn missing(path: &str) -> SyncError {
    SyncError::Protocol(format!("Path not found: {}", path))
}

fn add_at(doc: &mut Value, path: &str, value: Value) -> Result<(), SyncError> {
    let tokens = parse_pointer(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    match lookup_mut(doc, parents).ok_or_else(|| missing(path))? {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = array_index(last, items.len(), true).ok_or_else(|| missing(path))?;
            items.insert(index, value);
            Ok(())
        }
        _ => Err(missing(path)),
    }
}

fn remove_at(doc: &mut Value, path: &str) -> Result<Value, SyncError> {
    let tokens = parse_pointer(path)?;
    let (last, parents) = tokens
        .split_last()
        .ok_or_else(|| SyncError::Protocol("Cannot remove the document root".to_string()))?;
    match lookup_mut(doc, parents).ok_or_else(|| missing(path))? {
        Value::Object(map) => map.remove(last).ok_or_else(|| missing(path)),
        Value::Array(items) => {
            let index = array_index(last, items.len(), false).ok_or_else(|| missing(path))?;
            Ok(items.remove(index))
        }
        _ => Err(missing(path)),
    }
}

fn operand(patch: &Patch) -> Result<Value, SyncError> {
    patch.value.clone().ok_or_else(|| {
        SyncError::Protocol(format!("Missing value for {} at {}", patch.op, patch.path))
    })
}

fn source(patch: &Patch) -> Result<&str, SyncError> {
    patch.from.as_deref().ok_or_else(|| {
        SyncError::Protocol(format!("Missing from for {} at {}", patch.op, patch.path))
    })
}

/// Applies one operation in place. On error `doc` may be partially changed,
/// callers that need atomicity apply to a copy.
pub fn apply_patch(doc: &mut Value, patch: &Patch) -> Result<(), SyncError> {
    match patch.op {
        PatchOp::Add => add_at(doc, &patch.path, operand(patch)?),
        PatchOp::Remove => remove_at(doc, &patch.path).map(|_| ()),
        PatchOp::Replace => {
            let value = operand(patch)?;
            let tokens = parse_pointer(&patch.path)?;
            let target = lookup_mut(doc, &tokens).ok_or_else(|| missing(&patch.path))?;
            *target = value;
            Ok(())
        }
        PatchOp::Copy => {
            let from = source(patch)?;
            let value = lookup(doc, &parse_pointer(from)?)
                .cloned()
                .ok_or_else(|| missing(from))?;
            add_at(doc, &patch.path, value)
        }
        PatchOp::Move => {
            let from = source(patch)?;
            if patch.path.starts_with(&format!("{}/", from)) {
                return Err(SyncError::Protocol(format!(
                    "Cannot move {} into its own child {}",
                    from, patch.path
                )));
            }
            if from == patch.path {
                return Ok(());
            }
            let value = remove_at(doc, from)?;
            add_at(doc, &patch.path, value)
        }
        PatchOp::Test => {
            let expected = operand(patch)?;
            let actual = lookup(doc, &parse_pointer(&patch.path)?);
            if actual == Some(&expected) {
                Ok(())
            } else {
                Err(SyncError::Protocol(format!("Test failed at {}", patch.path)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pointer_escaping() {
        assert_eq!(escape_token("a/b~c"), "a~1b~0c");
        assert_eq!(pointer_for_key("a/b"), "/a~1b");
        assert_eq!(
            parse_pointer("/a~1b/~0x").unwrap(),
            vec!["a/b".to_string(), "~x".to_string()]
        );
        assert!(parse_pointer("").unwrap().is_empty());
        assert_eq!(parse_pointer("/").unwrap(), vec![String::new()]);
        assert!(parse_pointer("no-slash").is_err());
    }

    #[test]
    fn test_lookup_objects_and_arrays() {
        let doc = json!({"a": {"b": [10, 20, {"c": true}]}});
        let tokens = parse_pointer("/a/b/2/c").unwrap();
        assert_eq!(lookup(&doc, &tokens), Some(&json!(true)));
        assert_eq!(lookup(&doc, &parse_pointer("/a/b/3").unwrap()), None);
        assert_eq!(lookup(&doc, &parse_pointer("/a/b/01").unwrap()), None);
        assert_eq!(lookup(&doc, &[]), Some(&doc));
    }

    #[test]
    fn test_add_and_remove() {
        let mut doc = json!({"list": [1, 3]});
        apply_patch(&mut doc, &Patch::add("/list/1", json!(2))).unwrap();
        apply_patch(&mut doc, &Patch::add("/list/-", json!(4))).unwrap();
        apply_patch(&mut doc, &Patch::add("/name", json!(null))).unwrap();
        assert_eq!(doc, json!({"list": [1, 2, 3, 4], "name": null}));

        apply_patch(&mut doc, &Patch::remove("/list/0")).unwrap();
        apply_patch(&mut doc, &Patch::remove("/name")).unwrap();
        assert_eq!(doc, json!({"list": [2, 3, 4]}));

        assert!(apply_patch(&mut doc, &Patch::remove("/missing")).is_err());
        assert!(apply_patch(&mut doc, &Patch::add("/no/parent", json!(1))).is_err());
    }

    #[test]
    fn test_replace_requires_existing_target() {
        let mut doc = json!({"a": 1});
        apply_patch(&mut doc, &Patch::replace("/a", json!({"x": 1}))).unwrap();
        assert_eq!(doc, json!({"a": {"x": 1}}));
        assert!(apply_patch(&mut doc, &Patch::replace("/b", json!(2))).is_err());
    }

    #[test]
    fn test_copy_move_and_test() {
        let mut doc = json!({"a": {"n": 1}, "b": {}});
        apply_patch(&mut doc, &Patch::copy("/a", "/b/copy")).unwrap();
        apply_patch(&mut doc, &Patch::move_from("/a/n", "/moved")).unwrap();
        assert_eq!(doc, json!({"a": {}, "b": {"copy": {"n": 1}}, "moved": 1}));

        assert!(apply_patch(&mut doc, &Patch::test("/moved", json!(1))).is_ok());
        assert!(apply_patch(&mut doc, &Patch::test("/moved", json!(2))).is_err());
        assert!(apply_patch(&mut doc, &Patch::move_from("/b", "/b/inner")).is_err());
    }

    #[test]
    fn test_patch_wire_format() {
        let patch: Patch = serde_json::from_value(json!({"op": "add", "path": "/x", "value": null}))
            .unwrap();
        assert_eq!(patch.value, Some(Value::Null));

        let patch: Patch = serde_json::from_value(json!({"op": "remove", "path": "/"})).unwrap();
        assert!(patch.is_root_remove());
        assert_eq!(patch.value, None);

        let encoded = serde_json::to_value(Patch::move_from("/a", "/b")).unwrap();
        assert_eq!(encoded, json!({"op": "move", "path": "/b", "from": "/a"}));
    }
}
