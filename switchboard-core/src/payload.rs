//! Helpers for the JSON payloads handed to provider tools.

use serde_json::{Map, Value};

/// Field a non-object payload is wrapped under when it has to become an object.
pub const INPUT_FIELD: &str = "input";

/// Turn an arbitrary payload into an object.
///
/// `null` becomes an empty object; scalars and arrays are wrapped under
/// [`INPUT_FIELD`].
pub fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert(INPUT_FIELD.to_string(), other);
            map
        }
    }
}

/// Shallow-merge `overlay` into `base`, overlay keys winning.
pub fn merge_shallow(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

/// Serialize a value with object keys sorted at every depth.
///
/// Two payloads that differ only in key order produce the same string.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// True when `key` holds a string with non-whitespace content.
pub fn has_text(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

/// True when `key` holds boolean `true`.
pub fn is_flag_set(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}
