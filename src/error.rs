//! Structural error types for the protection pipeline.
//!
//! Per the engine's error-handling contract, *recoverable* failures (bad
//! config, failed inference, empty windows) never surface as `Err` — they
//! quietly return a neutral value and leave state untouched. Only the two
//! *structural* load paths (model, confusion matrix) are worth a typed
//! error for Rust-side callers; the FFI boundary still collapses both to a
//! plain bool/int.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("failed to load confusion matrix from {path}: {reason}")]
    ConfusionMatrixLoad { path: PathBuf, reason: String },
}
