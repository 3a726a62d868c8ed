//! Feature vector construction.
//!
//! Every model input is a 10-wide vector normalized to `[0, 1]`:
//! `[is_cpu, is_gpu, is_asic, cores, memory, clock, power, difficulty,
//! latency, algorithm suitability]`.

use crate::optimizer::network::INPUT_WIDTH;
use crate::optimizer::types::{MiningState, StratumConnection};
use crate::types::{HardwareProfile, HardwareType};
use tracing::debug;

/// Cores at which the core-count feature saturates.
pub const CORES_SCALE: f64 = 2048.0;
pub const MEMORY_MB_SCALE: f64 = 16384.0;
pub const CLOCK_GHZ_SCALE: f64 = 4.0;
pub const POWER_W_SCALE: f64 = 1500.0;
/// Pool share difficulty at which the difficulty feature saturates.
pub const DIFFICULTY_SCALE: f64 = 10_000.0;
/// Suitability for algorithm/hardware pairs missing from the table.
pub const DEFAULT_SUITABILITY: f64 = 0.5;

const SUITABILITY: &[(&str, HardwareType, f64)] = &[
    ("randomx", HardwareType::Cpu, 0.9),
    ("randomx", HardwareType::Gpu, 0.3),
    ("randomx", HardwareType::Asic, 0.1),
    ("cryptonight", HardwareType::Cpu, 0.8),
    ("cryptonight", HardwareType::Gpu, 0.6),
    ("cryptonight", HardwareType::Asic, 0.4),
    ("yescrypt", HardwareType::Cpu, 0.85),
    ("yescrypt", HardwareType::Gpu, 0.4),
    ("ethash", HardwareType::Cpu, 0.2),
    ("ethash", HardwareType::Gpu, 0.9),
    ("ethash", HardwareType::Asic, 0.6),
    ("kawpow", HardwareType::Cpu, 0.1),
    ("kawpow", HardwareType::Gpu, 0.95),
    ("etchash", HardwareType::Gpu, 0.9),
    ("etchash", HardwareType::Asic, 0.7),
    ("sha256", HardwareType::Cpu, 0.05),
    ("sha256", HardwareType::Gpu, 0.2),
    ("sha256", HardwareType::Asic, 1.0),
    ("scrypt", HardwareType::Cpu, 0.1),
    ("scrypt", HardwareType::Gpu, 0.4),
    ("scrypt", HardwareType::Asic, 0.95),
    ("x11", HardwareType::Cpu, 0.2),
    ("x11", HardwareType::Gpu, 0.5),
    ("x11", HardwareType::Asic, 0.9),
];

/// How well `algorithm` runs on `hardware_type`, in `[0, 1]`.
pub fn algorithm_suitability(algorithm: &str, hardware_type: HardwareType) -> f64 {
    let algorithm = algorithm.to_ascii_lowercase();
    SUITABILITY
        .iter()
        .find(|(name, hw, _)| *name == algorithm && *hw == hardware_type)
        .map(|(_, _, score)| *score)
        .unwrap_or(DEFAULT_SUITABILITY)
}

pub fn difficulty_factor(difficulty: f64) -> f64 {
    normalize(difficulty / DIFFICULTY_SCALE)
}

/// Share of submitted shares the pool rejected. Stale shares are the bulk of
/// rejections, so this stands in for network latency.
pub fn latency_factor(stratum: &StratumConnection) -> f64 {
    let total = stratum.accepted + stratum.rejected;
    if total == 0 {
        return 0.0;
    }
    normalize(stratum.rejected as f64 / total as f64)
}

/// Assemble the model input for a profile and three environment factors.
pub fn build_features(
    profile: &HardwareProfile,
    difficulty: f64,
    latency: f64,
    suitability: f64,
) -> Vec<f64> {
    let [is_cpu, is_gpu, is_asic] = profile.hardware_type.one_hot();
    let features = vec![
        is_cpu,
        is_gpu,
        is_asic,
        normalize(profile.cores as f64 / CORES_SCALE),
        normalize(profile.memory_mb as f64 / MEMORY_MB_SCALE),
        normalize(profile.clock_ghz / CLOCK_GHZ_SCALE),
        normalize(profile.power_draw_w / POWER_W_SCALE),
        normalize(difficulty),
        normalize(latency),
        normalize(suitability),
    ];
    debug_assert_eq!(features.len(), INPUT_WIDTH);
    features
}

/// Model input built from a device's live telemetry.
pub fn live_features(
    profile: &HardwareProfile,
    mining: &MiningState,
    stratum: &StratumConnection,
) -> Vec<f64> {
    let difficulty = difficulty_factor(stratum.difficulty);
    let latency = latency_factor(stratum);
    let suitability = algorithm_suitability(&mining.algorithm, profile.hardware_type);
    debug!(
        "Live factors for {}: difficulty={:.3}, latency={:.3}, suitability={:.2}",
        profile.key(),
        difficulty,
        latency,
        suitability
    );
    build_features(profile, difficulty, latency, suitability)
}

/// Clamp into `[0, 1]`, mapping NaN to zero.
fn normalize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::profiles::default_catalog;
    use chrono::Utc;

    fn stratum(accepted: u64, rejected: u64, difficulty: f64) -> StratumConnection {
        StratumConnection {
            pool: "stratum+tcp://pool.example:3333".to_string(),
            worker: "rig".to_string(),
            algorithm: "randomx".to_string(),
            difficulty,
            accepted,
            rejected,
            last_share: Utc::now(),
        }
    }

    #[test]
    fn test_suitability_table() {
        assert_eq!(algorithm_suitability("randomx", HardwareType::Cpu), 0.9);
        assert_eq!(algorithm_suitability("ethash", HardwareType::Gpu), 0.9);
        assert_eq!(algorithm_suitability("SHA256", HardwareType::Asic), 1.0);
        assert_eq!(algorithm_suitability("yescrypt", HardwareType::Asic), DEFAULT_SUITABILITY);
        assert_eq!(algorithm_suitability("blake3", HardwareType::Cpu), DEFAULT_SUITABILITY);
    }

    #[test]
    fn test_latency_factor() {
        assert_eq!(latency_factor(&stratum(0, 0, 1000.0)), 0.0);
        assert!((latency_factor(&stratum(90, 10, 1000.0)) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_difficulty_factor_saturates() {
        assert!((difficulty_factor(1000.0) - 0.1).abs() < 1e-12);
        assert_eq!(difficulty_factor(1e9), 1.0);
        assert_eq!(difficulty_factor(-5.0), 0.0);
    }

    #[test]
    fn test_features_are_normalized() {
        for profile in default_catalog() {
            let features = build_features(&profile, 0.4, 0.2, 0.9);
            assert_eq!(features.len(), INPUT_WIDTH);
            assert!(features.iter().all(|f| (0.0..=1.0).contains(f)));
            assert_eq!(features[0..3].iter().sum::<f64>(), 1.0);
        }
    }

    #[test]
    fn test_nan_is_zeroed() {
        let profile = &default_catalog()[0];
        let features = build_features(profile, f64::NAN, 0.0, 0.5);
        assert_eq!(features[7], 0.0);
    }
}
