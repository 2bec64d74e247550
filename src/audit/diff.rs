use std::collections::BTreeSet;

use serde_json::{Map, Number, Value};

use crate::audit::mappings::DisplayNames;
use crate::models::FieldChange;

pub type Snapshot = Map<String, Value>;

/// Keys that are identity or bookkeeping, never audited.
const RESERVED_KEYS: &[&str] = &["id", "version"];
const EXCLUDED_KEYS: &[&str] = &[
    "createdAt",
    "updatedAt",
    "lastModified",
    "created_at",
    "updated_at",
];

/// Columns of the visit row itself; `data` must never shadow them.
const STORE_KEYS: &[&str] = &["id", "orderId", "version", "createdAt", "updatedAt"];

pub fn is_tracked(key: &str) -> bool {
    !key.starts_with('_') && !RESERVED_KEYS.contains(&key) && !EXCLUDED_KEYS.contains(&key)
}

/// Whether a change to `key` may be applied to stored entity data.
pub fn is_writable(key: &str) -> bool {
    is_tracked(key) && !STORE_KEYS.contains(&key)
}

/// Field-level changes turning `old` into `new`. Either side may be absent
/// (creation, deletion). Output is ordered by field name.
pub fn compute_diff(
    old: Option<&Snapshot>,
    new: Option<&Snapshot>,
    names: DisplayNames<'_>,
) -> Vec<FieldChange> {
    let keys: BTreeSet<&String> = old
        .into_iter()
        .chain(new)
        .flat_map(|snapshot| snapshot.keys())
        .filter(|key| is_tracked(key))
        .collect();

    keys.into_iter()
        .filter_map(|key| {
            let before = field_value(old, key);
            let after = field_value(new, key);
            let unchanged = match (before, after) {
                (None, None) => true,
                (Some(a), Some(b)) => values_equal(a, b),
                _ => false,
            };
            (!unchanged).then(|| FieldChange {
                field: key.clone(),
                old_value: before.cloned(),
                new_value: after.cloned(),
                display_name: names.resolve(key),
            })
        })
        .collect()
}

/// Top-level `null` is treated as an absent field.
fn field_value<'a>(snapshot: Option<&'a Snapshot>, key: &str) -> Option<&'a Value> {
    snapshot
        .and_then(|s| s.get(key))
        .filter(|v| !v.is_null())
}

/// Structural equality: maps ignore key order, numbers compare by value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub fn invert(changes: &[FieldChange]) -> Vec<FieldChange> {
    changes.iter().map(FieldChange::inverse).collect()
}

pub fn apply_new_values(snapshot: &mut Snapshot, changes: &[FieldChange]) {
    for change in changes {
        set_field(snapshot, &change.field, change.new_value.as_ref());
    }
}

pub fn apply_old_values(snapshot: &mut Snapshot, changes: &[FieldChange]) {
    for change in changes {
        set_field(snapshot, &change.field, change.old_value.as_ref());
    }
}

fn set_field(snapshot: &mut Snapshot, field: &str, value: Option<&Value>) {
    match value {
        Some(v) if !v.is_null() => {
            snapshot.insert(field.to_string(), v.clone());
        }
        _ => {
            snapshot.remove(field);
        }
    }
}
