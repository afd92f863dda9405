// src/scripting/capabilities/os.rs — `os::*` platform introspection

use rhai::{Dynamic, ImmutableString, Module, INT};

use super::CapResult;

/// Host platform as seen by scripts. Values are stable and exposed as
/// `os::UNKNOWN`, `os::WINDOWS`, `os::LINUX`, `os::MACOS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    Unknown = 0,
    Windows = 1,
    Linux = 2,
    MacOs = 3,
}

impl OperatingSystem {
    pub fn current() -> Self {
        Self::from_name(std::env::consts::OS)
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "windows" => OperatingSystem::Windows,
            "linux" => OperatingSystem::Linux,
            "macos" => OperatingSystem::MacOs,
            _ => OperatingSystem::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OperatingSystem::Unknown => "unknown",
            OperatingSystem::Windows => "windows",
            OperatingSystem::Linux => "linux",
            OperatingSystem::MacOs => "macos",
        }
    }
}

pub fn module() -> Module {
    let mut module = Module::new();
    let current = OperatingSystem::current();

    module.set_var("UNKNOWN", OperatingSystem::Unknown as INT);
    module.set_var("WINDOWS", OperatingSystem::Windows as INT);
    module.set_var("LINUX", OperatingSystem::Linux as INT);
    module.set_var("MACOS", OperatingSystem::MacOs as INT);

    module.set_native_fn("current", move || -> CapResult<INT> { Ok(current as INT) });
    module.set_native_fn("name", move || -> CapResult<String> {
        Ok(current.name().to_string())
    });
    module.set_native_fn("is_windows", move || -> CapResult<bool> {
        Ok(current == OperatingSystem::Windows)
    });
    module.set_native_fn("is_linux", move || -> CapResult<bool> {
        Ok(current == OperatingSystem::Linux)
    });
    module.set_native_fn("is_macos", move || -> CapResult<bool> {
        Ok(current == OperatingSystem::MacOs)
    });
    module.set_native_fn("is_unknown", move || -> CapResult<bool> {
        Ok(current == OperatingSystem::Unknown)
    });

    module.set_native_fn("getenv", |name: ImmutableString| -> CapResult<Dynamic> {
        Ok(std::env::var(name.as_str())
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT))
    });

    module
}
