// src/mods/mod.rs — Mod records reported by provider plugins

pub mod record;

pub use record::{GameVersion, ModRecord, RecordError};
