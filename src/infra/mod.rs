// src/infra/mod.rs

pub mod config;
pub mod errors;
pub mod files;
pub mod logger;
pub mod paths;
