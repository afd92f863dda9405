// src/infra/errors.rs — Crate-level error type for TotalControl

use thiserror::Error;

use crate::mods::record::RecordError;
use crate::plugins::PluginError;
use crate::scripting::ScriptError;

#[derive(Error, Debug)]
pub enum TotalControlError {
    // Plugin lifecycle
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Invalid mod record: {0}")]
    Record(#[from] RecordError),

    // User errors
    #[error("Plugin '{id}' not found")]
    PluginNotFound { id: String },

    #[error("Mod '{id}' not found")]
    ModNotFound { id: String },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TotalControlError {
    /// Whether the failure came from a script exceeding its time budget.
    /// The plugin must be reloaded before it can be used again.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TotalControlError::Script(ScriptError::Timeout(_))
                | TotalControlError::Plugin(PluginError::Script(ScriptError::Timeout(_)))
        )
    }
}
