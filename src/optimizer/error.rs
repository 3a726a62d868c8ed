//! Error taxonomy for the optimization engine.

use crate::types::DeviceId;

/// Errors surfaced by the engine and its numeric model.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An operation that requires `initialize()` was attempted first.
    #[error("engine has not been initialized")]
    NotInitialized,

    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// No hardware profile could be resolved for the device.
    #[error("no hardware profile matches device {0}")]
    NoMatchingProfile(DeviceId),

    #[error("insufficient training data: {available} optimization results, {required} required")]
    InsufficientTrainingData { available: usize, required: usize },

    /// A vector did not have the width the model expects.
    #[error("shape mismatch: expected width {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("training task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("invalid model snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result alias used throughout the optimizer module.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidSnapshot(err.to_string())
    }
}
