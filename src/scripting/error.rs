// src/scripting/error.rs — Engine error type

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Engine identity must be a non-nil UUID")]
    NilIdentity,

    #[error("Engine is closed")]
    Closed,

    #[error("Engine is not ready (state: {state})")]
    NotReady { state: String },

    #[error("Failed to compile script '{script}': {message}")]
    Compile { script: String, message: String },

    #[error("Script '{script}' failed: {message}")]
    Runtime { script: String, message: String },

    // Lookup failures, distinct from failures raised by the callee.
    #[error("Function '{name}' not found")]
    FunctionNotFound { name: String },

    #[error("Object '{name}' not found")]
    ObjectNotFound { name: String },

    #[error("Method '{method}' not found on '{object}'")]
    MethodNotFound { object: String, method: String },

    #[error("Call to '{name}' failed: {message}")]
    CallFailed { name: String, message: String },

    #[error("Script timed out after {0:?}; the engine has been closed")]
    Timeout(Duration),

    #[error("Script worker stopped without returning a result")]
    WorkerLost,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// The callable did not exist, as opposed to existing and failing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ScriptError::FunctionNotFound { .. }
                | ScriptError::ObjectNotFound { .. }
                | ScriptError::MethodNotFound { .. }
        )
    }

    /// The engine can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScriptError::Closed | ScriptError::Timeout(_) | ScriptError::WorkerLost
        )
    }
}
