//! Turns raw model output into concrete device settings.

use crate::optimizer::error::{EngineError, Result};
use crate::optimizer::network::OUTPUT_WIDTH;
use crate::optimizer::types::{OptimizationResult, RecommendedSettings};
use crate::types::HardwareProfile;

/// Model outputs are scaled by this to recover hashrate and reward units.
pub const PREDICTION_SCALE: f64 = 1000.0;
pub const MAX_INTENSITY: u32 = 20;

/// Settings derived from `output = [hashrate, efficiency, power, reward]`.
pub fn recommend_settings(profile: &HardwareProfile, output: &[f64; OUTPUT_WIDTH]) -> RecommendedSettings {
    let efficiency = unit(output[1]);

    let scaled = (profile.base_threads() as f64 * (0.5 + 0.5 * efficiency)).floor() as u32;
    let threads = scaled.clamp(1, profile.max_threads().max(1));

    let intensity = ((efficiency * MAX_INTENSITY as f64).floor() as u32 + 1).min(MAX_INTENSITY);
    let memory_usage_percent = ((unit(output[0]) * 100.0).floor() as u32).min(100);

    // Higher predicted reward leans toward the more specialized algorithms.
    let candidates = profile.hardware_type.candidate_algorithms();
    let last = candidates.len().saturating_sub(1);
    let index = ((unit(output[3]) * candidates.len() as f64).floor() as usize).min(last);
    let algorithm = candidates.get(index).copied().unwrap_or_default().to_string();

    RecommendedSettings {
        threads,
        intensity,
        memory_usage_percent,
        algorithm,
    }
}

/// Denormalize a prediction and attach recommended settings.
pub fn build_result(
    profile: &HardwareProfile,
    output: &[f64],
    confidence: f64,
) -> Result<OptimizationResult> {
    let output: [f64; OUTPUT_WIDTH] = output.try_into().map_err(|_| EngineError::ShapeMismatch {
        expected: OUTPUT_WIDTH,
        actual: output.len(),
    })?;

    Ok(OptimizationResult {
        hashrate_prediction: unit(output[0]) * PREDICTION_SCALE,
        efficiency_prediction: unit(output[1]),
        power_optimization: unit(output[2]),
        reward_prediction: unit(output[3]) * PREDICTION_SCALE,
        confidence: unit(confidence),
        recommended_settings: recommend_settings(profile, &output),
    })
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
