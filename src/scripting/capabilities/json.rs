// src/scripting/capabilities/json.rs — `json::encode` / `json::decode`
//
// Encoding is flat on purpose: string keys mapped to strings, numbers,
// booleans or (). Nested maps and arrays are written as null.

use rhai::{Dynamic, ImmutableString, Module};
use serde_json::Value;

use super::{caller_error, CapResult};
use crate::scripting::marshal::{classify, json_to_dynamic, kind_of, to_host, Shape};

pub fn module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("encode", |value: Dynamic| -> CapResult<String> {
        let map = match classify(&value) {
            Shape::Record(map) => map,
            Shape::List(items) if items.is_empty() => rhai::Map::new(),
            _ => {
                return Err(caller_error(
                    "json::encode",
                    format!("expected a map, got {}", kind_of(&value)),
                ))
            }
        };

        let mut object = serde_json::Map::new();
        for (key, item) in &map {
            object.insert(key.to_string(), to_host(item).unwrap_or(Value::Null));
        }
        serde_json::to_string(&Value::Object(object)).map_err(|e| caller_error("json::encode", e))
    });

    module.set_native_fn("decode", |text: ImmutableString| -> CapResult<Dynamic> {
        if text.trim().is_empty() {
            return Ok(Dynamic::UNIT);
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(value @ Value::Object(_)) => Ok(json_to_dynamic(&value)),
            Ok(_) => {
                tracing::debug!("json::decode: top-level value is not an object");
                Ok(Dynamic::UNIT)
            }
            Err(e) => {
                tracing::debug!("json::decode: {}", e);
                Ok(Dynamic::UNIT)
            }
        }
    });

    module
}
