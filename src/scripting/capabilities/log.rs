// src/scripting/capabilities/log.rs — `log::*` functions and print/debug routing
//
// Every record is emitted under the `script` target with `script = true`,
// the owning engine's id and, when Rhai knows it, `source:line`.

use rhai::{Dynamic, Engine, ImmutableString, Module, NativeCallContext, Position};
use uuid::Uuid;

use super::{caller_error, CapResult, CapabilityContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl ScriptLevel {
    pub const ALL: [ScriptLevel; 5] = [
        ScriptLevel::Debug,
        ScriptLevel::Info,
        ScriptLevel::Warn,
        ScriptLevel::Error,
        ScriptLevel::Fatal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptLevel::Debug => "debug",
            ScriptLevel::Info => "info",
            ScriptLevel::Warn => "warn",
            ScriptLevel::Error => "error",
            ScriptLevel::Fatal => "fatal",
        }
    }

    /// Name of the `log::` function for this level. `debug` is a reserved
    /// word in Rhai, so that level is registered as `log_debug`.
    pub fn function_name(self) -> &'static str {
        match self {
            ScriptLevel::Debug => "log_debug",
            other => other.as_str(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        ScriptLevel::ALL.into_iter().find(|l| l.as_str() == name)
    }
}

/// `source:line`, `source`, `line N` or empty when nothing is known.
pub fn location(source: Option<&str>, position: Position) -> String {
    match (source.filter(|s| !s.is_empty()), position.line()) {
        (Some(src), Some(line)) => format!("{src}:{line}"),
        (Some(src), None) => src.to_string(),
        (None, Some(line)) => format!("line {line}"),
        (None, None) => String::new(),
    }
}

/// Emit one script-originated record.
pub fn emit(level: ScriptLevel, plugin: &Uuid, location: &str, message: &str) {
    match level {
        ScriptLevel::Debug => {
            tracing::debug!(target: "script", script = true, plugin = %plugin, location, "{}", message)
        }
        ScriptLevel::Info => {
            tracing::info!(target: "script", script = true, plugin = %plugin, location, "{}", message)
        }
        ScriptLevel::Warn => {
            tracing::warn!(target: "script", script = true, plugin = %plugin, location, "{}", message)
        }
        ScriptLevel::Error => {
            tracing::error!(target: "script", script = true, plugin = %plugin, location, "{}", message)
        }
        ScriptLevel::Fatal => {
            tracing::error!(target: "script", script = true, fatal = true, plugin = %plugin, location, "{}", message)
        }
    }
}

fn message_text(value: &Dynamic) -> String {
    if value.is_string() {
        value.clone().into_string().unwrap_or_default()
    } else {
        value.to_string()
    }
}

fn log_at(
    call: &NativeCallContext,
    level: ScriptLevel,
    plugin: &Uuid,
    message: &Dynamic,
) -> CapResult<()> {
    let text = message_text(message);
    let location = location(call.source(), call.call_position());
    emit(level, plugin, &location, &text);
    if level == ScriptLevel::Fatal {
        // Ends the current script call; the host keeps running.
        return Err(format!("fatal: {text}").into());
    }
    Ok(())
}

pub fn module(ctx: &CapabilityContext) -> Module {
    let mut module = Module::new();

    for level in ScriptLevel::ALL {
        let plugin = ctx.engine_id;
        module.set_native_fn(
            level.function_name(),
            move |call: NativeCallContext, message: Dynamic| -> CapResult<()> {
                log_at(&call, level, &plugin, &message)
            },
        );
    }

    let plugin = ctx.engine_id;
    module.set_native_fn(
        "log",
        move |call: NativeCallContext, level: ImmutableString, message: Dynamic| -> CapResult<()> {
            let level = ScriptLevel::parse(&level).ok_or_else(|| {
                caller_error("log::log", format!("unknown log level '{level}'"))
            })?;
            log_at(&call, level, &plugin, &message)
        },
    );

    module
}

/// Route Rhai's `print` and `debug` statements to the script log.
pub fn install_print_hooks(engine: &mut Engine, plugin: Uuid) {
    engine.on_print(move |text: &str| {
        emit(ScriptLevel::Info, &plugin, "", text);
    });
    engine.on_debug(move |text: &str, source: Option<&str>, position: Position| {
        emit(ScriptLevel::Debug, &plugin, &location(source, position), text);
    });
}
