//! Device telemetry store.
//!
//! Holds the `MiningState` and `StratumConnection` of every registered device.
//! Reads may run concurrently with an optimization cycle; updates are
//! serialized by the table's write lock.

use crate::optimizer::error::{EngineError, Result};
use crate::optimizer::types::{
    DeviceInfo, DeviceSnapshot, MiningState, MiningStateUpdate, StratumConnection,
};
use crate::types::DeviceId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_ALGORITHM: &str = "randomx";
pub const DEFAULT_DIFFICULTY: f64 = 1000.0;
pub const DEFAULT_TEMPERATURE_C: f64 = 50.0;
pub const DEFAULT_POWER_W: f64 = 100.0;
pub const DEFAULT_EFFICIENCY: f64 = 0.75;
pub const DEFAULT_POOL: &str = "unassigned";

#[derive(Debug, Clone)]
struct DeviceRecord {
    mining: MiningState,
    stratum: StratumConnection,
}

impl DeviceRecord {
    fn from_info(device_id: &str, info: &DeviceInfo, now: DateTime<Utc>) -> Self {
        let algorithm = info
            .algorithm
            .clone()
            .unwrap_or_else(|| DEFAULT_ALGORITHM.to_string());
        let difficulty = info.difficulty.unwrap_or(DEFAULT_DIFFICULTY);

        Self {
            mining: MiningState {
                algorithm: algorithm.clone(),
                hashrate: info.hashrate.unwrap_or(0.0).max(0.0),
                shares: 0,
                accepted: 0,
                rejected: 0,
                difficulty,
                last_share_time: now,
                uptime_seconds: 0,
                temperature_c: info.temperature.unwrap_or(DEFAULT_TEMPERATURE_C),
                power_w: info.power.unwrap_or(DEFAULT_POWER_W),
                efficiency: info.efficiency.unwrap_or(DEFAULT_EFFICIENCY).clamp(0.0, 1.0),
            },
            stratum: StratumConnection {
                pool: info.pool.clone().unwrap_or_else(|| DEFAULT_POOL.to_string()),
                worker: info.worker.clone().unwrap_or_else(|| device_id.to_string()),
                algorithm,
                difficulty,
                accepted: 0,
                rejected: 0,
                last_share: now,
            },
        }
    }

    fn snapshot(&self, device_id: &str) -> DeviceSnapshot {
        DeviceSnapshot {
            device_id: device_id.to_string(),
            mining: self.mining.clone(),
            stratum: self.stratum.clone(),
        }
    }
}

/// Merge a partial update into a device's telemetry.
///
/// When `shares` grows, the stratum connection's `last_share` moves to `now`
/// and its accepted/rejected counters grow by the deltas of the update.
pub fn apply_update(
    mining: &mut MiningState,
    stratum: &mut StratumConnection,
    update: &MiningStateUpdate,
    now: DateTime<Utc>,
) {
    if let Some(shares) = update.shares {
        if shares > mining.shares {
            stratum.last_share = now;
            mining.last_share_time = now;
            if let Some(accepted) = update.accepted {
                stratum.accepted += accepted.saturating_sub(mining.accepted);
            }
            if let Some(rejected) = update.rejected {
                stratum.rejected += rejected.saturating_sub(mining.rejected);
            }
        }
        mining.shares = shares;
    }

    if let Some(accepted) = update.accepted {
        mining.accepted = accepted;
    }
    if let Some(rejected) = update.rejected {
        mining.rejected = rejected;
    }
    if let Some(algorithm) = &update.algorithm {
        mining.algorithm = algorithm.clone();
        stratum.algorithm = algorithm.clone();
    }
    if let Some(difficulty) = update.difficulty {
        mining.difficulty = difficulty;
        stratum.difficulty = difficulty;
    }
    if let Some(hashrate) = update.hashrate {
        mining.hashrate = hashrate.max(0.0);
    }
    if let Some(uptime) = update.uptime_seconds {
        mining.uptime_seconds = uptime;
    }
    if let Some(temperature) = update.temperature_c {
        mining.temperature_c = temperature;
    }
    if let Some(power) = update.power_w {
        mining.power_w = power;
    }
    if let Some(efficiency) = update.efficiency {
        mining.efficiency = efficiency.clamp(0.0, 1.0);
    }
}

/// Keyed store of per-device telemetry.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    devices: RwLock<HashMap<DeviceId, DeviceRecord>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, filling unspecified fields with defaults.
    /// Re-registering resets the entry and returns the telemetry it replaced.
    #[instrument(skip(self, info), fields(device = %device_id))]
    pub async fn register(&self, device_id: &str, info: &DeviceInfo) -> Option<DeviceSnapshot> {
        let record = DeviceRecord::from_info(device_id, info, Utc::now());
        let mut devices = self.devices.write().await;
        match devices.insert(device_id.to_string(), record) {
            Some(previous) => {
                warn!("Device {} re-registered; telemetry reset", device_id);
                Some(previous.snapshot(device_id))
            }
            None => {
                info!("Registered device {}", device_id);
                None
            }
        }
    }

    /// Merge a partial update. Fails with `UnknownDevice` for unregistered
    /// ids without creating any state.
    #[instrument(skip(self, update), fields(device = %device_id))]
    pub async fn update(&self, device_id: &str, update: &MiningStateUpdate) -> Result<()> {
        let mut devices = self.devices.write().await;
        let record = devices
            .get_mut(device_id)
            .ok_or_else(|| EngineError::UnknownDevice(device_id.to_string()))?;

        apply_update(&mut record.mining, &mut record.stratum, update, Utc::now());
        debug!(
            "Updated device {}: shares={}, stratum accepted={}, rejected={}",
            device_id, record.mining.shares, record.stratum.accepted, record.stratum.rejected
        );
        Ok(())
    }

    pub async fn remove(&self, device_id: &str) -> Result<()> {
        let mut devices = self.devices.write().await;
        devices
            .remove(device_id)
            .map(|_| info!("Removed device {}", device_id))
            .ok_or_else(|| EngineError::UnknownDevice(device_id.to_string()))
    }

    pub async fn snapshot(&self, device_id: &str) -> Option<DeviceSnapshot> {
        let devices = self.devices.read().await;
        devices.get(device_id).map(|record| record.snapshot(device_id))
    }

    /// Every device, ordered by id.
    pub async fn snapshots(&self) -> Vec<DeviceSnapshot> {
        let devices = self.devices.read().await;
        let mut snapshots: Vec<_> = devices
            .iter()
            .map(|(device_id, record)| record.snapshot(device_id))
            .collect();
        snapshots.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    pub async fn contains(&self, device_id: &str) -> bool {
        self.devices.read().await.contains_key(device_id)
    }
}
