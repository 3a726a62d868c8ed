//! Hardware profile registry.
//!
//! Catalog of device archetypes keyed by `"{type}-{model}"`. Entries are
//! added at initialization and never mutated or removed afterwards.

use crate::types::{HardwareProfile, HardwareType};
use rand::Rng;
use tracing::{debug, warn};

/// Archetypes installed by default.
pub fn default_catalog() -> Vec<HardwareProfile> {
    vec![
        HardwareProfile {
            hardware_type: HardwareType::Cpu,
            model: "Ryzen 9 5950X".to_string(),
            cores: 16,
            memory_mb: 32768,
            clock_ghz: 3.4,
            power_draw_w: 105.0,
            efficiency: 0.85,
        },
        HardwareProfile {
            hardware_type: HardwareType::Gpu,
            model: "RTX 3080".to_string(),
            cores: 8704,
            memory_mb: 10240,
            clock_ghz: 1.71,
            power_draw_w: 320.0,
            efficiency: 0.75,
        },
        HardwareProfile {
            hardware_type: HardwareType::Asic,
            model: "Antminer S19 Pro".to_string(),
            cores: 342,
            memory_mb: 512,
            clock_ghz: 0.65,
            power_draw_w: 3250.0,
            efficiency: 0.95,
        },
        HardwareProfile {
            hardware_type: HardwareType::Cpu,
            model: "Core i9-12900K".to_string(),
            cores: 16,
            memory_mb: 32768,
            clock_ghz: 3.2,
            power_draw_w: 125.0,
            efficiency: 0.8,
        },
        HardwareProfile {
            hardware_type: HardwareType::Gpu,
            model: "Radeon RX 6800 XT".to_string(),
            cores: 4608,
            memory_mb: 16384,
            clock_ghz: 2.25,
            power_draw_w: 300.0,
            efficiency: 0.7,
        },
    ]
}

/// Insertion-ordered catalog of hardware profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: Vec<HardwareProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile. Returns `false` if its key is already present; the
    /// existing entry is kept.
    pub fn register(&mut self, profile: HardwareProfile) -> bool {
        let key = profile.key();
        if self.get(&key).is_some() {
            warn!("Hardware profile {} already registered; keeping existing entry", key);
            return false;
        }
        debug!("Registered hardware profile {}", key);
        self.profiles.push(profile);
        true
    }

    pub fn get(&self, key: &str) -> Option<&HardwareProfile> {
        self.profiles.iter().find(|p| p.key() == key)
    }

    /// First registered profile of the given class.
    pub fn first_of_type(&self, hardware_type: HardwareType) -> Option<&HardwareProfile> {
        self.profiles.iter().find(|p| p.hardware_type == hardware_type)
    }

    /// Resolve a device to a profile: exact key match on the device id, else
    /// the first profile of the class inferred from the id.
    pub fn resolve(&self, device_id: &str) -> Option<&HardwareProfile> {
        self.get(device_id)
            .or_else(|| self.first_of_type(HardwareType::infer_from_device_id(device_id)))
    }

    /// Uniformly sampled profile, `None` when the catalog is empty.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&HardwareProfile> {
        if self.profiles.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.profiles.len());
        self.profiles.get(index)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn default_registry() -> ProfileRegistry {
        let mut registry = ProfileRegistry::new();
        for profile in default_catalog() {
            registry.register(profile);
        }
        registry
    }

    #[test]
    fn test_default_catalog_covers_every_class() {
        let registry = default_registry();
        for hardware_type in [HardwareType::Cpu, HardwareType::Gpu, HardwareType::Asic] {
            assert!(registry.first_of_type(hardware_type).is_some());
        }
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = default_registry();
        let count = registry.len();
        assert!(!registry.register(default_catalog()[0].clone()));
        assert_eq!(registry.len(), count);
    }

    #[test]
    fn test_resolve_prefers_exact_key() {
        let registry = default_registry();
        let profile = registry.resolve("GPU-Radeon RX 6800 XT").unwrap();
        assert_eq!(profile.model, "Radeon RX 6800 XT");
    }

    #[test]
    fn test_resolve_falls_back_to_inferred_type() {
        let registry = default_registry();
        assert_eq!(registry.resolve("gpu-rig-7").unwrap().model, "RTX 3080");
        assert_eq!(registry.resolve("asic-farm-2").unwrap().model, "Antminer S19 Pro");
        assert_eq!(registry.resolve("worker-42").unwrap().model, "Ryzen 9 5950X");
    }

    #[test]
    fn test_resolve_without_matching_type() {
        let mut registry = ProfileRegistry::new();
        registry.register(default_catalog()[2].clone());
        assert!(registry.resolve("unidentifiable-123").is_none());
    }

    #[test]
    fn test_sample_empty_registry() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(ProfileRegistry::new().sample(&mut rng).is_none());
        assert!(default_registry().sample(&mut rng).is_some());
    }
}
