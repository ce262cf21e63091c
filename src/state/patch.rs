//! Patch operations delivered on topic subscriptions.
//!
//! A delivery is an array of `{op, path, value}` where `path` is a
//! `/`-delimited string. Paths are normalized into segment lists by dropping
//! empty segments, so `"/recs/12"` and `"recs/12"` address the same node.

use crate::error::PatchError;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Add,
    Replace,
    Remove,
}

impl PatchKind {
    pub fn from_op(s: &str) -> Option<Self> {
        match s {
            "add" => Some(PatchKind::Add),
            "replace" => Some(PatchKind::Replace),
            "remove" => Some(PatchKind::Remove),
            _ => None,
        }
    }
}

/// One normalized patch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOp {
    pub kind: PatchKind,
    pub path: Vec<String>,
    pub value: Value,
}

impl PatchOp {
    pub fn new(kind: PatchKind, path: &str, value: Value) -> Self {
        Self {
            kind,
            path: normalize_path(path),
            value,
        }
    }

    fn path_prefix(&self, len: usize) -> String {
        self.path[..len.min(self.path.len())].join("/")
    }
}

#[derive(Deserialize)]
struct RawPatch {
    op: String,
    path: RawPath,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPath {
    Text(String),
    Segments(Vec<Value>),
}

pub fn normalize_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a delivery into normalized operations.
pub fn parse_batch(delivery: Value) -> Result<Vec<PatchOp>, PatchError> {
    let raw: Vec<RawPatch> =
        serde_json::from_value(delivery).map_err(|e| PatchError::Malformed(e.to_string()))?;

    raw.into_iter()
        .map(|patch| {
            let kind =
                PatchKind::from_op(&patch.op).ok_or_else(|| PatchError::UnknownOp(patch.op))?;
            let path = match patch.path {
                RawPath::Text(text) => normalize_path(&text),
                RawPath::Segments(segments) => segments
                    .iter()
                    .filter_map(crate::shared::serde_util::value_as_key)
                    .collect(),
            };
            Ok(PatchOp {
                kind,
                path,
                value: patch.value,
            })
        })
        .collect()
}

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Whether applying `op` to `root` would leave it unchanged.
///
/// Setting a key to the value it already holds and removing an absent key
/// are no-ops; they must not produce a new snapshot.
pub fn is_noop(root: &Value, op: &PatchOp) -> bool {
    let Some((last, parents)) = op.path.split_last() else {
        return op.kind != PatchKind::Remove && *root == op.value;
    };

    let mut node = root;
    for segment in parents {
        match child(node, segment) {
            Some(next) => node = next,
            None => return false,
        }
    }

    match (node, op.kind) {
        (Value::Object(map), PatchKind::Remove) => !map.contains_key(last.as_str()),
        (Value::Object(map), PatchKind::Add | PatchKind::Replace) => {
            map.get(last.as_str()) == Some(&op.value)
        }
        (Value::Array(items), PatchKind::Replace) => last
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .map(|current| *current == op.value)
            .unwrap_or(false),
        _ => false,
    }
}

/// Apply one operation in place.
pub fn apply_op(root: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    let Some((last, parents)) = op.path.split_last() else {
        *root = match op.kind {
            PatchKind::Remove => Value::Null,
            PatchKind::Add | PatchKind::Replace => op.value.clone(),
        };
        return Ok(());
    };

    let mut node = root;
    for (depth, segment) in parents.iter().enumerate() {
        let next = match node {
            Value::Object(map) => map.get_mut(segment.as_str()),
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(i) => items.get_mut(i),
                Err(_) => None,
            },
            _ => return Err(PatchError::NotAContainer(op.path_prefix(depth))),
        };
        node = next.ok_or_else(|| PatchError::PathNotFound(op.path_prefix(depth + 1)))?;
    }

    let full_path = || op.path_prefix(op.path.len());

    match (node, op.kind) {
        (Value::Object(map), PatchKind::Add | PatchKind::Replace) => {
            map.insert(last.clone(), op.value.clone());
        }
        (Value::Object(map), PatchKind::Remove) => {
            map.remove(last.as_str());
        }
        (Value::Array(items), PatchKind::Add) if last == "-" => {
            items.push(op.value.clone());
        }
        (Value::Array(items), kind) => {
            let idx = last
                .parse::<usize>()
                .map_err(|_| PatchError::IndexOutOfRange(full_path()))?;
            match kind {
                PatchKind::Add if idx <= items.len() => items.insert(idx, op.value.clone()),
                PatchKind::Replace if idx < items.len() => items[idx] = op.value.clone(),
                PatchKind::Remove if idx < items.len() => {
                    items.remove(idx);
                }
                _ => return Err(PatchError::IndexOutOfRange(full_path())),
            }
        }
        _ => return Err(PatchError::NotAContainer(op.path_prefix(parents.len()))),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/recs/12/markets"), vec!["recs", "12", "markets"]);
        assert_eq!(normalize_path("recs//12/"), vec!["recs", "12"]);
        assert!(normalize_path("").is_empty());
        assert!(normalize_path("/").is_empty());
    }

    #[test]
    fn test_parse_batch() {
        let ops = parse_batch(json!([
            {"op": "replace", "path": "", "value": {"recs": {}}},
            {"op": "add", "path": "/recs/1", "value": 5},
            {"op": "remove", "path": ["recs", 1]},
        ]))
        .unwrap();

        assert_eq!(ops.len(), 3);
        assert!(ops[0].path.is_empty());
        assert_eq!(ops[1].path, vec!["recs", "1"]);
        assert_eq!(ops[2].kind, PatchKind::Remove);
        assert_eq!(ops[2].path, vec!["recs", "1"]);
    }

    #[test]
    fn test_parse_batch_rejects_unknown_op() {
        let err = parse_batch(json!([{"op": "move", "path": "/a"}])).unwrap_err();
        assert_eq!(err, PatchError::UnknownOp("move".into()));
        assert!(matches!(
            parse_batch(json!({"op": "add"})),
            Err(PatchError::Malformed(_))
        ));
    }

    #[test]
    fn test_apply_nested_object() {
        let mut root = json!({"recs": {"1": {"status": null}}});
        apply_op(
            &mut root,
            &PatchOp::new(PatchKind::Replace, "/recs/1/status", json!("live")),
        )
        .unwrap();
        apply_op(&mut root, &PatchOp::new(PatchKind::Add, "/recs/2", json!({}))).unwrap();
        apply_op(&mut root, &PatchOp::new(PatchKind::Remove, "/recs/2", Value::Null)).unwrap();
        assert_eq!(root, json!({"recs": {"1": {"status": "live"}}}));
    }

    #[test]
    fn test_apply_array_ops() {
        let mut root = json!({"list": [1, 3]});
        apply_op(&mut root, &PatchOp::new(PatchKind::Add, "/list/1", json!(2))).unwrap();
        apply_op(&mut root, &PatchOp::new(PatchKind::Add, "/list/-", json!(4))).unwrap();
        apply_op(&mut root, &PatchOp::new(PatchKind::Replace, "/list/0", json!(0))).unwrap();
        apply_op(&mut root, &PatchOp::new(PatchKind::Remove, "/list/3", Value::Null)).unwrap();
        assert_eq!(root, json!({"list": [0, 2, 3]}));

        let err = apply_op(&mut root, &PatchOp::new(PatchKind::Replace, "/list/9", json!(1)));
        assert_eq!(err, Err(PatchError::IndexOutOfRange("list/9".into())));
    }

    #[test]
    fn test_apply_missing_parent() {
        let mut root = json!({});
        let err = apply_op(&mut root, &PatchOp::new(PatchKind::Add, "/a/b", json!(1)));
        assert_eq!(err, Err(PatchError::PathNotFound("a".into())));
    }

    #[test]
    fn test_apply_root_replace() {
        let mut root = Value::Null;
        apply_op(&mut root, &PatchOp::new(PatchKind::Replace, "", json!({"x": 1}))).unwrap();
        assert_eq!(root, json!({"x": 1}));
    }

    #[test]
    fn test_is_noop() {
        let root = json!({"a": {"b": 1}, "l": [5]});
        assert!(is_noop(&root, &PatchOp::new(PatchKind::Replace, "/a/b", json!(1))));
        assert!(is_noop(&root, &PatchOp::new(PatchKind::Remove, "/a/zz", Value::Null)));
        assert!(is_noop(&root, &PatchOp::new(PatchKind::Replace, "/l/0", json!(5))));
        assert!(!is_noop(&root, &PatchOp::new(PatchKind::Replace, "/a/b", json!(2))));
        assert!(!is_noop(&root, &PatchOp::new(PatchKind::Add, "/l/0", json!(5))));
        assert!(!is_noop(&root, &PatchOp::new(PatchKind::Add, "/missing/x", json!(1))));
    }
}
