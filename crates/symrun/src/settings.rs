//! Deep-merge reconciliation of local defaults with host-pushed settings.
//!
//! Used once when the handshake completes and again whenever the host pushes
//! a settings-changed event.

use serde_json::Map;
use serde_json::Value;

/// Deep-merges `sources` into `target`, left to right, mutating `target` in
/// place.
///
/// Rules, per key of a source object:
/// - object on both sides: recurse (a non-object target value is replaced by
///   an empty object first);
/// - array on both sides: set union — target elements first, then source
///   elements not already present. Presence is value equality for scalars
///   only; object and array elements always append;
/// - anything else: the source value overwrites the target's.
///
/// A non-object `target` or source is left untouched. No sources, no change.
pub fn deep_merge(target: &mut Value, sources: &[Value]) {
    let Some(target) = target.as_object_mut() else {
        return;
    };
    for source in sources {
        if let Some(source) = source.as_object() {
            merge_object(target, source);
        }
    }
}

fn merge_object(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, incoming) in source {
        match incoming {
            Value::Object(nested) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(existing) = slot {
                    merge_object(existing, nested);
                }
            }
            Value::Array(items) => match target.get_mut(key) {
                Some(Value::Array(existing)) => union_arrays(existing, items),
                _ => {
                    target.insert(key.clone(), incoming.clone());
                }
            },
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

fn union_arrays(target: &mut Vec<Value>, source: &[Value]) {
    for item in source {
        let duplicate = is_scalar(item) && target.contains(item);
        if !duplicate {
            target.push(item.clone());
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !(value.is_object() || value.is_array())
}
