// src/scripting/marshal.rs — Value conversion between host values and Rhai values
//
// Host values are modelled as serde_json::Value. Host to script is total:
// anything that cannot be represented becomes `()`. Script to host only
// converts scalars implicitly; maps and arrays must be classified with
// `Shape` and converted in an explicitly requested direction.

use rhai::{Array, Dynamic, Map};
use serde::Serialize;
use serde_json::Value;

/// Convert any serializable host value into a script value.
/// Values serde cannot represent marshal to `()`.
pub fn to_script<T: Serialize + ?Sized>(value: &T) -> Dynamic {
    match serde_json::to_value(value) {
        Ok(json) => json_to_dynamic(&json),
        Err(e) => {
            tracing::debug!("Value not representable in scripts, using (): {}", e);
            Dynamic::UNIT
        }
    }
}

/// Convert a serde_json::Value to a Rhai Dynamic.
pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(arr) => {
            let rhai_arr: Array = arr.iter().map(json_to_dynamic).collect();
            Dynamic::from_array(rhai_arr)
        }
        Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.as_str().into(), json_to_dynamic(v));
            }
            Dynamic::from_map(map)
        }
    }
}

/// Convert a scalar script value to a host value.
///
/// Returns `None` for maps, arrays and any other non-scalar value: callers
/// must classify those with [`classify`] first.
pub fn to_host(value: &Dynamic) -> Option<Value> {
    let value = value.flatten_clone();
    if value.is_unit() {
        Some(Value::Null)
    } else if value.is_bool() {
        value.as_bool().ok().map(Value::Bool)
    } else if value.is_int() {
        value.as_int().ok().map(Value::from)
    } else if value.is_float() {
        value
            .as_float()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    } else if value.is_string() {
        value.into_string().ok().map(Value::String)
    } else if value.is_char() {
        value.as_char().ok().map(|c| Value::String(c.to_string()))
    } else {
        None
    }
}

/// Script value as a string, if it is one.
pub fn as_string(value: &Dynamic) -> Option<String> {
    let value = value.flatten_clone();
    if value.is_string() {
        value.into_string().ok()
    } else {
        None
    }
}

/// Human-readable type name used in error messages.
pub fn kind_of(value: &Dynamic) -> String {
    let value = value.flatten_clone();
    if value.is_unit() {
        "()".to_string()
    } else if value.is_map() {
        "map".to_string()
    } else if value.is_array() {
        "array".to_string()
    } else if value.is::<rhai::FnPtr>() {
        "function".to_string()
    } else {
        value.type_name().to_string()
    }
}

// ---------------------------------------------------------------------------
// Shape classification
// ---------------------------------------------------------------------------

/// Structural classification of a script value before business logic reads it.
#[derive(Debug, Clone)]
pub enum Shape {
    Record(Map),
    List(Array),
    Invalid { reason: String },
}

/// Classify a script value as a record (map), a list (array) or neither.
pub fn classify(value: &Dynamic) -> Shape {
    let value = value.flatten_clone();
    if value.is_map() {
        match value.try_cast::<Map>() {
            Some(map) => Shape::Record(map),
            None => Shape::Invalid {
                reason: "map could not be read".into(),
            },
        }
    } else if value.is_array() {
        match value.try_cast::<Array>() {
            Some(items) => Shape::List(items),
            None => Shape::Invalid {
                reason: "array could not be read".into(),
            },
        }
    } else {
        Shape::Invalid {
            reason: format!("expected a map or an array, got {}", kind_of(&value)),
        }
    }
}

impl Shape {
    /// Read as a record. An empty list is accepted as an empty record.
    pub fn into_record(self) -> Result<Map, String> {
        match self {
            Shape::Record(map) => Ok(map),
            Shape::List(items) if items.is_empty() => Ok(Map::new()),
            Shape::List(_) => Err("expected a map, got a non-empty array".into()),
            Shape::Invalid { reason } => Err(reason),
        }
    }

    /// Read as a list. An empty record is accepted as an empty list, and a
    /// map whose values are all maps yields those values in key order.
    pub fn into_list(self) -> Result<Array, String> {
        match self {
            Shape::List(items) => Ok(items),
            Shape::Record(map) if map.is_empty() => Ok(Array::new()),
            Shape::Record(map) => {
                if map.values().all(|v| v.flatten_clone().is_map()) {
                    Ok(map.into_values().collect())
                } else {
                    Err("expected an array, got a map with non-map values".into())
                }
            }
            Shape::Invalid { reason } => Err(reason),
        }
    }
}

/// Recursively convert a record into a host JSON object.
pub fn record_to_host(map: &Map) -> Result<serde_json::Map<String, Value>, String> {
    let mut out = serde_json::Map::new();
    for (key, value) in map {
        out.insert(key.to_string(), value_to_host(value)?);
    }
    Ok(out)
}

/// Recursively convert a list into a host JSON array.
pub fn list_to_host(items: &Array) -> Result<Vec<Value>, String> {
    items.iter().map(value_to_host).collect()
}

fn value_to_host(value: &Dynamic) -> Result<Value, String> {
    if let Some(scalar) = to_host(value) {
        return Ok(scalar);
    }
    match classify(value) {
        Shape::Record(map) => record_to_host(&map).map(Value::Object),
        Shape::List(items) => list_to_host(&items).map(Value::Array),
        Shape::Invalid { .. } => Err(format!(
            "unsupported value type '{}'",
            kind_of(value)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_json_to_dynamic_primitives() {
        assert!(json_to_dynamic(&json!(null)).is_unit());
        assert!(json_to_dynamic(&json!(true)).as_bool().unwrap());
        assert_eq!(json_to_dynamic(&json!(42)).as_int().unwrap(), 42);
        assert_eq!(json_to_dynamic(&json!(1.5)).as_float().unwrap(), 1.5);
        assert_eq!(
            json_to_dynamic(&json!("hello")).into_string().unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_to_script_nested() {
        let value = to_script(&json!({"name": "x", "tags": ["a", "b"], "meta": {"n": 1}}));
        let map = value.cast::<Map>();
        assert_eq!(map.len(), 3);
        let tags = map["tags"].clone().cast::<Array>();
        assert_eq!(tags.len(), 2);
        let meta = map["meta"].clone().cast::<Map>();
        assert_eq!(meta["n"].as_int().unwrap(), 1);
    }

    #[test]
    fn test_to_script_unsupported_is_unit() {
        // Maps with non-string keys cannot become JSON.
        let mut weird = std::collections::HashMap::new();
        weird.insert(vec![1u8], 1);
        assert!(to_script(&weird).is_unit());
    }

    #[test]
    fn test_to_host_scalars() {
        assert_eq!(to_host(&Dynamic::UNIT), Some(Value::Null));
        assert_eq!(to_host(&Dynamic::from(true)), Some(json!(true)));
        assert_eq!(to_host(&Dynamic::from(7_i64)), Some(json!(7)));
        assert_eq!(to_host(&Dynamic::from(2.5_f64)), Some(json!(2.5)));
        assert_eq!(to_host(&Dynamic::from("abc")), Some(json!("abc")));
    }

    #[test]
    fn test_to_host_refuses_tables() {
        assert_eq!(to_host(&Dynamic::from_map(Map::new())), None);
        assert_eq!(to_host(&Dynamic::from_array(Array::new())), None);
    }

    #[test]
    fn test_classify() {
        assert!(matches!(classify(&Dynamic::from_map(Map::new())), Shape::Record(_)));
        assert!(matches!(classify(&Dynamic::from_array(vec![])), Shape::List(_)));
        match classify(&Dynamic::from(3_i64)) {
            Shape::Invalid { reason } => assert!(reason.contains("i64")),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_empty_tables_follow_requested_direction() {
        let empty_map = classify(&Dynamic::from_map(Map::new()));
        assert!(empty_map.clone().into_list().unwrap().is_empty());
        assert!(empty_map.into_record().unwrap().is_empty());

        let empty_list = classify(&Dynamic::from_array(vec![]));
        assert!(empty_list.clone().into_record().unwrap().is_empty());
        assert!(empty_list.into_list().unwrap().is_empty());
    }

    #[test]
    fn test_keyed_records_read_as_list() {
        let mut inner = Map::new();
        inner.insert("id".into(), Dynamic::from("a"));
        let mut outer = Map::new();
        outer.insert("a".into(), Dynamic::from_map(inner));

        let items = classify(&Dynamic::from_map(outer)).into_list().unwrap();
        assert_eq!(items.len(), 1);

        let mut mixed = Map::new();
        mixed.insert("x".into(), Dynamic::from(1_i64));
        assert!(classify(&Dynamic::from_map(mixed)).into_list().is_err());
    }

    #[test]
    fn test_record_to_host_recursive() {
        let value = json_to_dynamic(&json!({"a": 1, "b": {"c": [true, "x"]}}));
        let map = classify(&value).into_record().unwrap();
        let host = record_to_host(&map).unwrap();
        assert_eq!(Value::Object(host), json!({"a": 1, "b": {"c": [true, "x"]}}));
    }

    #[test]
    fn test_record_to_host_rejects_functions() {
        let mut map = Map::new();
        map.insert("f".into(), Dynamic::from(rhai::FnPtr::new("foo").unwrap()));
        let err = record_to_host(&map).unwrap_err();
        assert!(err.contains("function"));
    }
}
