//! Error types for pipe device provisioning.
//!
//! Variants that wrap a cause expose it through `source()` only, so chain
//! reporters print each cause once.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::control::ModuleIndex;

/// Failure reported by a module control channel.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to start control client")]
    Spawn(#[source] std::io::Error),

    #[error("Control request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request rejected (exit status {status}): {stderr}")]
    Rejected { status: i32, stderr: String },

    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    #[error("Invalid JSON reply")]
    Json(#[from] serde_json::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

/// Result type for control channel requests.
pub type ControlResult<T> = Result<T, ControlError>;

/// Pipe device error type.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("Module load failed: {module}")]
    ModuleLoad {
        module: &'static str,
        #[source]
        source: ControlError,
    },

    #[error("Pipe open failed: {}", path.display())]
    PipeOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Module unload failed: {index}")]
    ModuleUnload {
        index: ModuleIndex,
        #[source]
        source: ControlError,
    },

    #[error("Module listing failed")]
    Query(#[source] ControlError),

    #[error("Invalid device name: {0:?} (must be non-empty, without '/' or NUL)")]
    InvalidName(String),

    #[error("Invalid latency: {0} ms (must be a finite value >= 0)")]
    InvalidLatency(f64),
}

/// Result type for pipe device operations.
pub type PipeResult<T> = Result<T, PipeError>;
