//! Training data synthesis.
//!
//! Two sources of labeled examples:
//! - bootstrap: synthetic examples drawn from the hardware catalog and
//!   closed-form performance heuristics, used to train a fresh model;
//! - continual: live device telemetry labeled with observed hashrate and
//!   efficiency, used by the self-improvement cycle.

use crate::optimizer::features::{build_features, live_features};
use crate::optimizer::profiles::ProfileRegistry;
use crate::optimizer::types::{DeviceSnapshot, OptimizationHistory, TrainingExample};
use crate::types::HardwareProfile;
use rand::Rng;
use tracing::{debug, info, instrument};

/// Raw hashrate/reward heuristics are divided by this before clamping.
pub const OUTPUT_SCALE: f64 = 1000.0;

/// One synthetic example for `profile`.
pub fn bootstrap_example<R: Rng + ?Sized>(profile: &HardwareProfile, rng: &mut R) -> TrainingExample {
    let difficulty: f64 = rng.gen();
    let latency: f64 = rng.gen();
    let suitability: f64 = rng.gen();

    let hashrate_factor = profile.hardware_type.throughput_multiplier()
        * (profile.cores as f64 / 1000.0)
        * profile.clock_ghz
        * suitability;
    let efficiency_factor = profile.efficiency * (1.0 - latency) * (1.0 - difficulty * 0.2);
    let power_optimization_factor = 0.5 + rng.gen::<f64>() * 0.5;
    let reward_factor = hashrate_factor * efficiency_factor * (1.0 - difficulty * 0.1);

    TrainingExample {
        input: build_features(profile, difficulty, latency, suitability),
        expected_output: vec![
            scale_down(hashrate_factor),
            efficiency_factor.clamp(0.0, 1.0),
            power_optimization_factor,
            scale_down(reward_factor),
        ],
    }
}

/// `count` synthetic examples over randomly sampled catalog profiles. Empty
/// when the catalog is empty.
#[instrument(skip(registry, rng), fields(profiles = registry.len()))]
pub fn bootstrap_examples<R: Rng + ?Sized>(
    registry: &ProfileRegistry,
    count: usize,
    rng: &mut R,
) -> Vec<TrainingExample> {
    let mut examples = Vec::with_capacity(count);
    for _ in 0..count {
        let Some(profile) = registry.sample(rng) else {
            break;
        };
        examples.push(bootstrap_example(profile, rng));
    }
    info!("Synthesized {} bootstrap examples", examples.len());
    examples
}

/// Examples built from live telemetry for every device with a resolvable
/// profile.
///
/// Hashrate and efficiency targets are observed values. Power optimization
/// and reward have no ground truth, so the device's latest optimization (or
/// the fleet's latest, if the device has none) stands in as a weak label.
pub fn continual_examples(
    registry: &ProfileRegistry,
    devices: &[DeviceSnapshot],
    history: &OptimizationHistory,
) -> Vec<TrainingExample> {
    let mut examples = Vec::with_capacity(devices.len());
    for device in devices {
        let Some(profile) = registry.resolve(&device.device_id) else {
            debug!("Skipping {}: no matching hardware profile", device.device_id);
            continue;
        };
        let Some(previous) = history.latest_for(&device.device_id).or_else(|| history.latest()) else {
            debug!("Skipping {}: no optimization history to label from", device.device_id);
            continue;
        };

        examples.push(TrainingExample {
            input: live_features(profile, &device.mining, &device.stratum),
            expected_output: vec![
                scale_down(device.mining.hashrate),
                device.mining.efficiency.clamp(0.0, 1.0),
                previous.result.power_optimization.clamp(0.0, 1.0),
                scale_down(previous.result.reward_prediction),
            ],
        });
    }
    examples
}

fn scale_down(value: f64) -> f64 {
    (value / OUTPUT_SCALE).clamp(0.0, 1.0)
}
