// src/scripting/mod.rs — Embedded Rhai host: engine, capabilities, cache, value marshaling

pub mod cache_store;
pub mod capabilities;
pub mod engine;
pub mod error;
pub mod marshal;
pub mod runtime;
pub mod supervisor;

pub use capabilities::{ExposedCapabilities, HttpSettings, PluginRoot};
pub use engine::{EngineOptions, EngineState, ScriptEngine};
pub use error::ScriptError;
pub use runtime::RuntimeLimits;
