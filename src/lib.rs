// src/lib.rs — Library root for TotalControl

pub mod cli;
pub mod infra;
pub mod mods;
pub mod plugins;
pub mod scripting;
