//! Optimizer module - fleet mining-optimization engine.
//!
//! A small trainable model maps hardware and network features to predicted
//! mining performance. The engine periodically re-scores every registered
//! device, turns predictions into tuning recommendations, and retrains the
//! model from live telemetry.

pub mod types;
pub mod error;
pub mod network;
pub mod features;
pub mod training;
pub mod profiles;
pub mod telemetry;
pub mod recommendation;
pub mod reporting;
pub mod engine;
mod scheduler;

// Re-export main public types and the engine
pub use engine::MiningOptimizer;
pub use error::{EngineError, Result};
pub use types::{
    CloudMinerConnection, DeviceInfo, DeviceSnapshot, EngineConfig, EngineEvent,
    EngineEventReceiver, EngineStatus, HistoryEntry, MiningState, MiningStateUpdate,
    OptimizationResult, RecommendedSettings, StratumConnection, TrainingExample,
};

// Re-export other key components for advanced usage
pub use network::{Activation, Layer, NeuralNetwork};
pub use profiles::ProfileRegistry;
pub use reporting::{PerformanceCollector, PerformanceSink, TracingSink};
pub use telemetry::TelemetryStore;

use crate::types::HardwareProfile;
use std::sync::Arc;
use std::time::Duration;

/// Engine builder for convenient construction with sensible defaults.
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    /// Set both cycle periods.
    pub fn with_intervals(mut self, optimization: Duration, self_improvement: Duration) -> Self {
        self.config.optimization_interval_ms = optimization.as_millis() as u64;
        self.config.self_improvement_interval_ms = self_improvement.as_millis() as u64;
        self
    }

    /// Set bootstrap example and epoch counts.
    pub fn with_bootstrap(mut self, examples: usize, epochs: usize) -> Self {
        self.config.bootstrap_examples = examples;
        self.config.bootstrap_epochs = epochs;
        self
    }

    /// Set self-improvement epochs and the history required before it runs.
    pub fn with_self_improvement(mut self, epochs: usize, min_history: usize) -> Self {
        self.config.improvement_epochs = epochs;
        self.config.min_history_for_improvement = min_history;
        self
    }

    pub fn with_self_improvement_enabled(mut self, enabled: bool) -> Self {
        self.config.self_improvement_enabled = enabled;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    /// Seed the engine's RNG for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// Replace the hardware catalog installed by `initialize()`.
    pub fn with_profiles(mut self, profiles: Vec<HardwareProfile>) -> Self {
        self.config.profiles = profiles;
        self
    }

    /// Build the engine configuration.
    pub fn build_config(self) -> EngineConfig {
        self.config
    }

    /// Build the engine, reporting to `sink`.
    pub fn build(self, sink: Arc<dyn PerformanceSink>) -> MiningOptimizer {
        MiningOptimizer::new(self.config, sink)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
