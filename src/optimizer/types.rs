//! Value types, events and configuration for the optimization engine.

use crate::optimizer::profiles::default_catalog;
use crate::types::{DeviceId, HardwareProfile};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// Live mining counters for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningState {
    pub algorithm: String,
    /// Hashes per second
    pub hashrate: f64,
    pub shares: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub difficulty: f64,
    pub last_share_time: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub temperature_c: f64,
    pub power_w: f64,
    /// Observed efficiency (0.0-1.0)
    pub efficiency: f64,
}

/// Pool-session bookkeeping for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumConnection {
    pub pool: String,
    pub worker: String,
    pub algorithm: String,
    pub difficulty: f64,
    pub accepted: u64,
    pub rejected: u64,
    pub last_share: DateTime<Utc>,
}

/// Partial telemetry update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningStateUpdate {
    pub algorithm: Option<String>,
    pub hashrate: Option<f64>,
    pub shares: Option<u64>,
    pub accepted: Option<u64>,
    pub rejected: Option<u64>,
    pub difficulty: Option<f64>,
    pub uptime_seconds: Option<u64>,
    pub temperature_c: Option<f64>,
    pub power_w: Option<f64>,
    pub efficiency: Option<f64>,
}

/// Caller-supplied facts used when registering a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub algorithm: Option<String>,
    pub hashrate: Option<f64>,
    pub difficulty: Option<f64>,
    pub temperature: Option<f64>,
    pub power: Option<f64>,
    pub efficiency: Option<f64>,
    pub pool: Option<String>,
    pub worker: Option<String>,
}

/// Both telemetry records of a device, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device_id: DeviceId,
    pub mining: MiningState,
    pub stratum: StratumConnection,
}

/// A remote (cloud) miner to attach to the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudMinerConnection {
    /// Label used as device id and reporting label
    pub name: String,
    pub pool: String,
    pub worker: String,
    pub algorithm: String,
    pub hashrate: f64,
    pub efficiency: f64,
}

/// Concrete tuning settings for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedSettings {
    pub threads: u32,
    /// 1-20
    pub intensity: u32,
    /// 0-100
    pub memory_usage_percent: u32,
    pub algorithm: String,
}

/// Model output for one device, denormalized into engine units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub hashrate_prediction: f64,
    pub efficiency_prediction: f64,
    pub power_optimization: f64,
    pub reward_prediction: f64,
    pub confidence: f64,
    pub recommended_settings: RecommendedSettings,
}

/// An optimization result as kept in the engine's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub device_id: DeviceId,
    pub recorded_at: DateTime<Utc>,
    pub result: OptimizationResult,
}

/// FIFO buffer of recent optimization results.
#[derive(Debug, Clone)]
pub struct OptimizationHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl OptimizationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest once capacity is reached.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Most recent entry recorded for `device_id`.
    pub fn latest_for(&self, device_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().rev().find(|e| e.device_id == device_id)
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// A labeled feature/target pair consumed by a training pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub input: Vec<f64>,
    pub expected_output: Vec<f64>,
}

/// Snapshot of engine state for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub initialized: bool,
    pub running: bool,
    pub model_layers: usize,
    pub accuracy: f64,
    pub iterations: u64,
    pub device_count: usize,
    pub last_optimization_time: Option<DateTime<Utc>>,
    pub self_improvement_enabled: bool,
    pub self_improvement_cycles: u64,
    pub last_improvement_time: Option<DateTime<Utc>>,
}

/// Notifications published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EngineEvent {
    Started,
    Stopped,
    Optimization {
        device_id: DeviceId,
        result: OptimizationResult,
    },
    SelfImprovement {
        previous_accuracy: f64,
        new_accuracy: f64,
        total_iterations: u64,
    },
}

// --- Communication channels ---

pub type EngineEventSender = tokio::sync::broadcast::Sender<EngineEvent>;
pub type EngineEventReceiver = tokio::sync::broadcast::Receiver<EngineEvent>;

/// Engine configuration. Every field has a production default; tests shorten
/// periods and epoch counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub learning_rate: f64,
    /// Reserved for momentum updates; currently unused by training
    pub momentum: f64,
    pub optimization_interval_ms: u64,
    pub self_improvement_interval_ms: u64,
    pub self_improvement_enabled: bool,
    /// Synthetic examples generated for the bootstrap run
    pub bootstrap_examples: usize,
    pub bootstrap_epochs: usize,
    pub improvement_epochs: usize,
    /// Optimization results required before self-improvement runs
    pub min_history_for_improvement: usize,
    pub history_capacity: usize,
    pub accuracy_history_capacity: usize,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
    /// Fixed RNG seed; entropy-seeded when absent
    pub rng_seed: Option<u64>,
    pub profiles: Vec<HardwareProfile>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.9,
            optimization_interval_ms: 30 * 60 * 1000,
            self_improvement_interval_ms: 60 * 60 * 1000,
            self_improvement_enabled: true,
            bootstrap_examples: 1000,
            bootstrap_epochs: 500,
            improvement_epochs: 100,
            min_history_for_improvement: 10,
            history_capacity: 100,
            accuracy_history_capacity: 10,
            event_buffer: 64,
            rng_seed: None,
            profiles: default_catalog(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn optimization_interval(&self) -> Duration {
        Duration::from_millis(self.optimization_interval_ms.max(1))
    }

    pub fn self_improvement_interval(&self) -> Duration {
        Duration::from_millis(self.self_improvement_interval_ms.max(1))
    }
}
