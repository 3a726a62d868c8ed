//! Core hardware types shared across the fleet optimizer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered mining device.
pub type DeviceId = String;

/// Broad class of mining hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HardwareType {
    Cpu,
    Gpu,
    Asic,
}

impl HardwareType {
    /// Returns the canonical upper-case name used in profile keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareType::Cpu => "CPU",
            HardwareType::Gpu => "GPU",
            HardwareType::Asic => "ASIC",
        }
    }

    /// Infer the hardware class from a device identifier.
    ///
    /// Identifiers mentioning `asic` or `gpu` (case-insensitive) map to those
    /// classes; anything else is treated as a CPU miner.
    pub fn infer_from_device_id(device_id: &str) -> HardwareType {
        let id = device_id.to_ascii_lowercase();
        if id.contains("asic") {
            HardwareType::Asic
        } else if id.contains("gpu") {
            HardwareType::Gpu
        } else {
            HardwareType::Cpu
        }
    }

    /// Raw throughput multiplier used by bootstrap synthesis.
    pub fn throughput_multiplier(&self) -> f64 {
        match self {
            HardwareType::Asic => 1000.0,
            HardwareType::Gpu => 100.0,
            HardwareType::Cpu => 10.0,
        }
    }

    /// Candidate algorithms, ordered from general to specialized.
    pub fn candidate_algorithms(&self) -> &'static [&'static str] {
        match self {
            HardwareType::Cpu => &["randomx", "cryptonight", "yescrypt"],
            HardwareType::Gpu => &["ethash", "kawpow", "etchash"],
            HardwareType::Asic => &["sha256", "scrypt", "x11"],
        }
    }

    /// One-hot encoding as `[is_cpu, is_gpu, is_asic]`.
    pub fn one_hot(&self) -> [f64; 3] {
        match self {
            HardwareType::Cpu => [1.0, 0.0, 0.0],
            HardwareType::Gpu => [0.0, 1.0, 0.0],
            HardwareType::Asic => [0.0, 0.0, 1.0],
        }
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized description of a device archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// Hardware class
    #[serde(rename = "type")]
    pub hardware_type: HardwareType,
    /// Vendor model name
    pub model: String,
    /// Compute units (CPU cores, GPU shader cores, ASIC hashing chips)
    pub cores: u32,
    /// On-board memory in megabytes
    pub memory_mb: u32,
    /// Nominal clock in GHz
    pub clock_ghz: f64,
    /// Power draw at full load in watts
    pub power_draw_w: f64,
    /// Vendor-rated efficiency (0.0-1.0)
    pub efficiency: f64,
}

impl HardwareProfile {
    /// Catalog key, formatted as `"{type}-{model}"`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.hardware_type, self.model)
    }

    /// Thread count a device of this class starts from before scaling.
    pub fn base_threads(&self) -> u32 {
        match self.hardware_type {
            HardwareType::Cpu => self.cores,
            HardwareType::Gpu => self.cores.div_ceil(64),
            HardwareType::Asic => 1,
        }
    }

    /// Upper bound on recommended threads.
    pub fn max_threads(&self) -> u32 {
        match self.hardware_type {
            HardwareType::Cpu => self.cores.max(1),
            HardwareType::Gpu | HardwareType::Asic => 32,
        }
    }
}
