// src/scripting/capabilities/cache.rs — `cache::*` functions over the engine's CacheStore

use rhai::{Dynamic, ImmutableString, Map, Module, FLOAT, INT};
use serde_json::Value;

use super::{caller_error, CapResult, CapabilityContext};
use crate::scripting::cache_store::{self, SharedCacheStore};
use crate::scripting::marshal::{kind_of, to_host, to_script};

pub fn module(ctx: &CapabilityContext) -> Module {
    let mut module = Module::new();

    // `has` never raises: an empty key is simply absent.
    let store = ctx.cache.clone();
    module.set_native_fn("has", move |key: ImmutableString| -> CapResult<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        Ok(cache_store::lock(&store).has(&key))
    });

    let store = ctx.cache.clone();
    module.set_native_fn("get", move |key: ImmutableString| -> CapResult<Dynamic> {
        require_key("cache::get", &key)?;
        Ok(cache_store::lock(&store)
            .get(&key)
            .map(|value| to_script(&value))
            .unwrap_or(Dynamic::UNIT))
    });

    let store = ctx.cache.clone();
    module.set_native_fn(
        "set",
        move |key: ImmutableString, value: Dynamic| -> CapResult<()> {
            set_value(&store, &key, &value, 0)
        },
    );

    let store = ctx.cache.clone();
    module.set_native_fn(
        "set",
        move |key: ImmutableString, value: Dynamic, ttl: INT| -> CapResult<()> {
            if ttl < 0 {
                return Err(caller_error("cache::set", "ttl cannot be negative"));
            }
            set_value(&store, &key, &value, ttl)
        },
    );

    let store = ctx.cache.clone();
    module.set_native_fn(
        "set",
        move |key: ImmutableString, value: Dynamic, ttl: FLOAT| -> CapResult<()> {
            if ttl.is_nan() || ttl < 0.0 {
                return Err(caller_error("cache::set", "ttl cannot be negative"));
            }
            let ttl = if ttl >= INT::MAX as FLOAT {
                INT::MAX
            } else {
                ttl as INT
            };
            set_value(&store, &key, &value, ttl)
        },
    );

    let store = ctx.cache.clone();
    module.set_native_fn("delete", move |key: ImmutableString| -> CapResult<bool> {
        require_key("cache::delete", &key)?;
        Ok(cache_store::lock(&store).delete(&key))
    });

    let store = ctx.cache.clone();
    module.set_native_fn("clear", move || -> CapResult<()> {
        cache_store::lock(&store).clear();
        Ok(())
    });

    let store = ctx.cache.clone();
    module.set_native_fn("len", move || -> CapResult<INT> {
        Ok(cache_store::lock(&store).len() as INT)
    });

    module
}

fn require_key(function: &str, key: &str) -> CapResult<()> {
    if key.is_empty() {
        Err(caller_error(function, "key cannot be empty"))
    } else {
        Ok(())
    }
}

fn set_value(store: &SharedCacheStore, key: &str, value: &Dynamic, ttl: INT) -> CapResult<()> {
    require_key("cache::set", key)?;
    let value = cacheable(value).map_err(|e| caller_error("cache::set", e))?;
    cache_store::lock(store).set(key, value, ttl);
    Ok(())
}

/// Strings, numbers, booleans and maps of those. Anything else is refused
/// with the offending kind in the message.
fn cacheable(value: &Dynamic) -> Result<Value, String> {
    let value = value.flatten_clone();
    if value.is_map() {
        let map = value.cast::<Map>();
        let mut out = serde_json::Map::new();
        for (key, item) in &map {
            let converted = cacheable(item).map_err(|e| format!("{e} (at key '{key}')"))?;
            out.insert(key.to_string(), converted);
        }
        return Ok(Value::Object(out));
    }

    let scalar = value.is_string()
        || value.is_char()
        || value.is_int()
        || value.is_float()
        || value.is_bool();
    match to_host(&value) {
        Some(converted) if scalar => Ok(converted),
        _ => Err(format!("unsupported value type '{}'", kind_of(&value))),
    }
}
