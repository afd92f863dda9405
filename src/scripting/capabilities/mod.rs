// src/scripting/capabilities/mod.rs — Host modules exposed to plugin scripts
//
// Every engine gets its own set of modules. The closures inside capture the
// engine's own cache store and settings; nothing is looked up through
// process-wide state. Scripts reach them as `cache::get(..)`, `http::get(..)`.

pub mod cache;
pub mod http;
pub mod io;
pub mod json;
pub mod log;
pub mod os;

use rhai::{Engine, EvalAltResult};
use uuid::Uuid;

use crate::scripting::cache_store::SharedCacheStore;

pub use self::http::HttpSettings;
pub use self::io::PluginRoot;

/// Result type of every native function exposed to scripts.
pub type CapResult<T> = Result<T, Box<EvalAltResult>>;

/// Error raised back into the script, catchable with `try`/`catch`.
pub(crate) fn caller_error(function: &str, message: impl std::fmt::Display) -> Box<EvalAltResult> {
    format!("{function}: {message}").into()
}

// ---------------------------------------------------------------------------
// Which modules to expose
// ---------------------------------------------------------------------------

/// Controls which capability modules are registered. Logging is always on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedCapabilities {
    pub cache: bool,
    pub http: bool,
    pub json: bool,
    pub io: bool,
    pub os: bool,
}

impl Default for ExposedCapabilities {
    fn default() -> Self {
        Self {
            cache: true,
            http: true,
            json: true,
            io: true,
            os: true,
        }
    }
}

impl ExposedCapabilities {
    /// Logging only.
    pub fn none() -> Self {
        Self {
            cache: false,
            http: false,
            json: false,
            io: false,
            os: false,
        }
    }

    /// Build from module names as listed in a plugin manifest.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut exposed = Self::none();
        for name in names {
            match name.as_ref() {
                "cache" => exposed.cache = true,
                "http" => exposed.http = true,
                "json" => exposed.json = true,
                "io" | "fs" => exposed.io = true,
                "os" => exposed.os = true,
                "log" => {}
                other => return Err(format!("unknown capability '{other}'")),
            }
        }
        Ok(exposed)
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Everything a capability closure may reach: the owning engine's identity,
/// its cache store and its settings.
#[derive(Clone)]
pub struct CapabilityContext {
    pub engine_id: Uuid,
    pub cache: SharedCacheStore,
    pub http: HttpSettings,
    pub root: Option<PluginRoot>,
    pub exposed: ExposedCapabilities,
}

/// Register the exposed modules on a fresh Rhai engine.
pub fn register_all(engine: &mut Engine, ctx: &CapabilityContext) {
    log::install_print_hooks(engine, ctx.engine_id);
    engine.register_static_module("log", log::module(ctx).into());

    if ctx.exposed.cache {
        engine.register_static_module("cache", cache::module(ctx).into());
    }
    if ctx.exposed.http {
        engine.register_static_module("http", http::module(ctx).into());
    }
    if ctx.exposed.json {
        engine.register_static_module("json", json::module().into());
    }
    if ctx.exposed.io {
        engine.register_static_module("io", io::module(ctx).into());
    }
    if ctx.exposed.os {
        engine.register_static_module("os", os::module().into());
    }

    tracing::debug!(
        engine = %ctx.engine_id,
        exposed = ?ctx.exposed,
        "Registered script capabilities"
    );
}
