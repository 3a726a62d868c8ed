//! fleet-optimizer - Self-improving mining optimization engine
//!
//! This crate scores a fleet of mining devices with a small feed-forward
//! network, recommends per-device tuning, and keeps retraining the model from
//! the telemetry the fleet reports.

pub mod types;
pub mod optimizer;

// Re-export main types for convenience
pub use types::{DeviceId, HardwareProfile, HardwareType};
pub use optimizer::{EngineBuilder, EngineConfig, EngineError, MiningOptimizer};
