//! Field-level diff between two JSON documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One changed leaf. `None` means the field is absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Changed fields between `before` and `after`, ordered by path. Objects are
/// compared key by key; arrays and scalars are compared whole.
pub fn diff(before: Option<&Value>, after: Option<&Value>) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    walk("", before, after, &mut changes);
    changes
}

fn walk(path: &str, before: Option<&Value>, after: Option<&Value>, out: &mut Vec<FieldChange>) {
    match (before, after) {
        (Some(Value::Object(a)), Some(Value::Object(b))) => walk_objects(path, a, b, out),
        (a, b) if a == b => {}
        (a, b) => out.push(FieldChange {
            path: if path.is_empty() { "$".to_string() } else { path.to_string() },
            before: a.cloned(),
            after: b.cloned(),
        }),
    }
}

fn walk_objects(path: &str, a: &Map<String, Value>, b: &Map<String, Value>, out: &mut Vec<FieldChange>) {
    let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        let child = if path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", path, key)
        };
        walk(&child, a.get(key), b.get(key), out);
    }
}

/// Serialize a diff for an audit event's `changes` field.
pub fn to_changes(before: Option<&Value>, after: Option<&Value>) -> Value {
    let fields = diff(before, after);
    serde_json::json!({
        "before": before.cloned().unwrap_or(Value::Null),
        "after": after.cloned().unwrap_or(Value::Null),
        "fields": fields,
    })
}
