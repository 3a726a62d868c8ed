//! Mining optimization engine.
//!
//! Owns the model, the hardware catalog, the device telemetry and the
//! optimization history. External collaborators interact through
//! [`MiningOptimizer`]: telemetry goes in via `register_device` /
//! `update_mining_state`, results come out via `get_optimization`,
//! `get_status` and the event channel.

use crate::optimizer::error::{EngineError, Result};
use crate::optimizer::features::live_features;
use crate::optimizer::network::NeuralNetwork;
use crate::optimizer::profiles::ProfileRegistry;
use crate::optimizer::recommendation::build_result;
use crate::optimizer::reporting::PerformanceSink;
use crate::optimizer::scheduler::CycleScheduler;
use crate::optimizer::telemetry::TelemetryStore;
use crate::optimizer::training::{bootstrap_examples, continual_examples};
use crate::optimizer::types::{
    CloudMinerConnection, DeviceInfo, DeviceSnapshot, EngineConfig, EngineEvent,
    EngineEventReceiver, EngineEventSender, EngineStatus, HistoryEntry, MiningStateUpdate,
    OptimizationHistory, OptimizationResult,
};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initialized,
    Running,
    Stopped,
}

#[derive(Debug, Default)]
struct ImprovementStats {
    cycles: u64,
    last_time: Option<DateTime<Utc>>,
    accuracy_history: VecDeque<f64>,
}

/// State shared between the public handle and the scheduler tasks.
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    lifecycle: RwLock<Lifecycle>,
    model: RwLock<Option<NeuralNetwork>>,
    profiles: RwLock<ProfileRegistry>,
    devices: TelemetryStore,
    history: RwLock<OptimizationHistory>,
    improvement: RwLock<ImprovementStats>,
    last_optimization: RwLock<Option<DateTime<Utc>>>,
    rng: Mutex<StdRng>,
    /// Serializes passes that replace the model. Training passes carry the
    /// guard into the blocking pool, so it is held until the pass ends even
    /// when the awaiting task is aborted.
    training: Arc<Mutex<()>>,
    sink: Arc<dyn PerformanceSink>,
    events: EngineEventSender,
}

impl EngineShared {
    fn publish(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    async fn model_snapshot(&self) -> Result<NeuralNetwork> {
        self.model
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(EngineError::NotInitialized)
    }

    /// Score every registered device and record the results. Devices that
    /// cannot be scored are logged and skipped. Returns the number of devices
    /// optimized.
    #[instrument(skip(self))]
    pub(crate) async fn optimization_cycle(&self) -> Result<usize> {
        let network = self.model_snapshot().await?;
        let profiles = self.profiles.read().await.clone();
        let devices = self.devices.snapshots().await;

        let mut optimized = 0;
        for device in &devices {
            let result = match evaluate_device(&network, &profiles, device) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Skipping device {}: {}", device.device_id, e);
                    continue;
                }
            };

            self.history.write().await.push(HistoryEntry {
                device_id: device.device_id.clone(),
                recorded_at: Utc::now(),
                result: result.clone(),
            });
            self.sink
                .report_performance(
                    &device.device_id,
                    result.hashrate_prediction,
                    result.efficiency_prediction,
                )
                .await;
            self.publish(EngineEvent::Optimization {
                device_id: device.device_id.clone(),
                result,
            });
            optimized += 1;
        }

        *self.last_optimization.write().await = Some(Utc::now());
        info!(
            "Optimization cycle complete: {}/{} devices optimized",
            optimized,
            devices.len()
        );
        Ok(optimized)
    }

    /// Retrain the model on live telemetry. Returns `false` when no example
    /// could be built and the model was left alone.
    #[instrument(skip(self))]
    pub(crate) async fn self_improvement_cycle(&self) -> Result<bool> {
        let training = Arc::clone(&self.training).lock_owned().await;
        let network = self.model_snapshot().await?;

        let examples = {
            let history = self.history.read().await;
            let required = self.config.min_history_for_improvement;
            if history.len() < required {
                return Err(EngineError::InsufficientTrainingData {
                    available: history.len(),
                    required,
                });
            }
            let devices = self.devices.snapshots().await;
            let profiles = self.profiles.read().await;
            continual_examples(&profiles, &devices, &history)
        };

        if examples.is_empty() {
            info!("Self-improvement skipped: no device yielded a training example");
            return Ok(false);
        }

        let previous_accuracy = network.accuracy;
        let epochs = self.config.improvement_epochs;
        let example_count = examples.len();
        let (network, _training) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut network = network;
            network.train(&examples, epochs)?;
            Ok((network, training))
        })
        .await??;

        let new_accuracy = network.accuracy;
        let total_iterations = network.iterations;
        *self.model.write().await = Some(network);

        {
            let mut stats = self.improvement.write().await;
            stats.cycles += 1;
            stats.last_time = Some(Utc::now());
            stats.accuracy_history.push_back(new_accuracy);
            while stats.accuracy_history.len() > self.config.accuracy_history_capacity {
                stats.accuracy_history.pop_front();
            }
        }

        info!(
            "Self-improvement over {} examples: accuracy {:.4} -> {:.4} ({} total iterations)",
            example_count, previous_accuracy, new_accuracy, total_iterations
        );
        self.publish(EngineEvent::SelfImprovement {
            previous_accuracy,
            new_accuracy,
            total_iterations,
        });
        Ok(true)
    }
}

fn evaluate_device(
    network: &NeuralNetwork,
    profiles: &ProfileRegistry,
    device: &DeviceSnapshot,
) -> Result<OptimizationResult> {
    let profile = profiles
        .resolve(&device.device_id)
        .ok_or_else(|| EngineError::NoMatchingProfile(device.device_id.clone()))?;
    let input = live_features(profile, &device.mining, &device.stratum);
    let output = network.predict(&input)?;
    build_result(profile, &output, network.accuracy)
}

/// Handle to the optimization engine.
pub struct MiningOptimizer {
    shared: Arc<EngineShared>,
    scheduler: Mutex<Option<CycleScheduler>>,
}

impl MiningOptimizer {
    /// Create an engine. Nothing is trained until [`initialize`](Self::initialize).
    pub fn new(config: EngineConfig, sink: Arc<dyn PerformanceSink>) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        let shared = EngineShared {
            lifecycle: RwLock::new(Lifecycle::Created),
            model: RwLock::new(None),
            profiles: RwLock::new(ProfileRegistry::new()),
            devices: TelemetryStore::new(),
            history: RwLock::new(OptimizationHistory::new(config.history_capacity)),
            improvement: RwLock::new(ImprovementStats::default()),
            last_optimization: RwLock::new(None),
            rng: Mutex::new(rng),
            training: Arc::new(Mutex::new(())),
            sink,
            events,
            config,
        };

        Self {
            shared: Arc::new(shared),
            scheduler: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Populate the hardware catalog and train a fresh model on synthetic
    /// data. Idempotent: later calls return immediately.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<bool> {
        let shared = &self.shared;
        let training = Arc::clone(&shared.training).lock_owned().await;
        if *shared.lifecycle.read().await != Lifecycle::Created {
            debug!("Engine already initialized");
            return Ok(true);
        }

        {
            let mut profiles = shared.profiles.write().await;
            for profile in &shared.config.profiles {
                profiles.register(profile.clone());
            }
            if profiles.is_empty() {
                warn!("Hardware catalog is empty; the model starts untrained and no device can be scored");
            } else {
                info!("Hardware catalog holds {} profiles", profiles.len());
            }
        }

        let (network, examples) = {
            let mut rng = shared.rng.lock().await;
            let network = NeuralNetwork::mining_model(
                shared.config.learning_rate,
                shared.config.momentum,
                &mut *rng,
            );
            let profiles = shared.profiles.read().await;
            let examples = bootstrap_examples(&profiles, shared.config.bootstrap_examples, &mut *rng);
            (network, examples)
        };

        let epochs = shared.config.bootstrap_epochs;
        let (network, _training) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut network = network;
            network.train(&examples, epochs)?;
            Ok((network, training))
        })
        .await??;

        info!(
            "Bootstrap training finished: accuracy {:.4} after {} epochs",
            network.accuracy, network.iterations
        );
        *shared.model.write().await = Some(network);
        *shared.lifecycle.write().await = Lifecycle::Initialized;
        Ok(true)
    }

    /// Start both periodic cycles. Fails with `NotInitialized` before
    /// `initialize()`; a no-op when already running.
    pub async fn start(&self) -> Result<bool> {
        let mut scheduler = self.scheduler.lock().await;
        {
            let mut lifecycle = self.shared.lifecycle.write().await;
            match *lifecycle {
                Lifecycle::Created => return Err(EngineError::NotInitialized),
                Lifecycle::Running => {
                    debug!("Engine already running");
                    return Ok(true);
                }
                Lifecycle::Initialized | Lifecycle::Stopped => *lifecycle = Lifecycle::Running,
            }
        }

        *scheduler = Some(CycleScheduler::spawn(Arc::clone(&self.shared)));
        info!("Mining optimizer started");
        self.shared.publish(EngineEvent::Started);
        Ok(true)
    }

    /// Halt both cycles; no tick fires once this returns. Learned state is
    /// kept. Returns `false` when the engine was not running.
    pub async fn stop(&self) -> Result<bool> {
        let mut scheduler = self.scheduler.lock().await;
        if let Some(running) = scheduler.take() {
            running.shutdown().await;
        }

        let mut lifecycle = self.shared.lifecycle.write().await;
        if *lifecycle != Lifecycle::Running {
            return Ok(false);
        }
        *lifecycle = Lifecycle::Stopped;
        drop(lifecycle);

        info!("Mining optimizer stopped");
        self.shared.publish(EngineEvent::Stopped);
        Ok(true)
    }

    /// Register a device. Registering a known id resets its telemetry.
    pub async fn register_device(&self, device_id: &str, info: DeviceInfo) -> Result<bool> {
        if let Some(previous) = self.shared.devices.register(device_id, &info).await {
            debug!(
                "Dropped telemetry of {}: {} shares, {} accepted",
                device_id, previous.mining.shares, previous.stratum.accepted
            );
        }
        Ok(true)
    }

    /// Merge a partial telemetry update.
    pub async fn update_mining_state(&self, device_id: &str, update: MiningStateUpdate) -> Result<bool> {
        self.shared.devices.update(device_id, &update).await?;
        Ok(true)
    }

    pub async fn unregister_device(&self, device_id: &str) -> Result<bool> {
        self.shared.devices.remove(device_id).await?;
        Ok(true)
    }

    /// Attach a remote miner as a device and report its advertised
    /// performance once.
    #[instrument(skip(self, connection), fields(miner = %connection.name))]
    pub async fn connect_cloud_miner(&self, connection: CloudMinerConnection) -> Result<bool> {
        let info = DeviceInfo {
            algorithm: Some(connection.algorithm.clone()),
            hashrate: Some(connection.hashrate),
            efficiency: Some(connection.efficiency),
            pool: Some(connection.pool.clone()),
            worker: Some(connection.worker.clone()),
            ..DeviceInfo::default()
        };
        self.shared.devices.register(&connection.name, &info).await;
        self.shared
            .sink
            .report_performance(&connection.name, connection.hashrate, connection.efficiency)
            .await;
        info!("Connected cloud miner {} on {}", connection.name, connection.pool);
        Ok(true)
    }

    /// Score one device against the current model without touching the
    /// history, the sink or the event channel. `None` when no hardware
    /// profile matches the device.
    pub async fn get_optimization(&self, device_id: &str) -> Result<Option<OptimizationResult>> {
        let model = self.shared.model.read().await;
        let network = model.as_ref().ok_or(EngineError::NotInitialized)?;
        let device = self
            .shared
            .devices
            .snapshot(device_id)
            .await
            .ok_or_else(|| EngineError::UnknownDevice(device_id.to_string()))?;
        let profiles = self.shared.profiles.read().await;

        match evaluate_device(network, &profiles, &device) {
            Ok(result) => Ok(Some(result)),
            Err(EngineError::NoMatchingProfile(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Current engine state; never fails.
    pub async fn get_status(&self) -> EngineStatus {
        let lifecycle = *self.shared.lifecycle.read().await;
        let (model_layers, accuracy, iterations) = match self.shared.model.read().await.as_ref() {
            Some(network) => (network.layers.len(), network.accuracy, network.iterations),
            None => (0, 0.0, 0),
        };
        let improvement = self.shared.improvement.read().await;

        EngineStatus {
            initialized: lifecycle != Lifecycle::Created,
            running: lifecycle == Lifecycle::Running,
            model_layers,
            accuracy,
            iterations,
            device_count: self.shared.devices.len().await,
            last_optimization_time: *self.shared.last_optimization.read().await,
            self_improvement_enabled: self.shared.config.self_improvement_enabled,
            self_improvement_cycles: improvement.cycles,
            last_improvement_time: improvement.last_time,
        }
    }

    /// Run one optimization cycle now.
    pub async fn run_optimization_cycle(&self) -> Result<usize> {
        self.shared.optimization_cycle().await
    }

    /// Run one self-improvement cycle now.
    pub async fn run_self_improvement_cycle(&self) -> Result<bool> {
        self.shared.self_improvement_cycle().await
    }

    pub fn subscribe(&self) -> EngineEventReceiver {
        self.shared.events.subscribe()
    }

    pub async fn device_snapshot(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.shared.devices.snapshot(device_id).await
    }

    pub async fn optimization_history(&self) -> Vec<HistoryEntry> {
        self.shared.history.read().await.to_vec()
    }

    /// Accuracy after each recent self-improvement pass, oldest first.
    pub async fn accuracy_history(&self) -> Vec<f64> {
        self.shared
            .improvement
            .read()
            .await
            .accuracy_history
            .iter()
            .copied()
            .collect()
    }

    /// Clone of the current model.
    pub async fn model(&self) -> Result<NeuralNetwork> {
        self.shared.model_snapshot().await
    }

    pub async fn export_model(&self) -> Result<String> {
        self.shared.model_snapshot().await?.to_json()
    }

    /// Replace the current model with a snapshot from [`export_model`](Self::export_model).
    pub async fn import_model(&self, json: &str) -> Result<()> {
        let network = NeuralNetwork::from_json(json)?;
        let expected = self.shared.model_snapshot().await?;
        if network.input_width != expected.input_width || network.output_width() != expected.output_width() {
            return Err(EngineError::InvalidSnapshot(format!(
                "expected {} -> {} network, got {} -> {}",
                expected.input_width,
                expected.output_width(),
                network.input_width,
                network.output_width()
            )));
        }

        let _training = self.shared.training.lock().await;
        *self.shared.model.write().await = Some(network);
        info!("Imported model snapshot");
        Ok(())
    }
}

impl Drop for MiningOptimizer {
    fn drop(&mut self) {
        if let Ok(mut scheduler) = self.scheduler.try_lock() {
            if let Some(running) = scheduler.take() {
                running.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::reporting::TracingSink;

    fn quick_config() -> EngineConfig {
        EngineConfig {
            bootstrap_examples: 40,
            bootstrap_epochs: 3,
            improvement_epochs: 2,
            rng_seed: Some(17),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_status_before_initialize() {
        let engine = MiningOptimizer::new(quick_config(), Arc::new(TracingSink));
        let status = engine.get_status().await;

        assert!(!status.initialized);
        assert!(!status.running);
        assert_eq!(status.model_layers, 0);
        assert_eq!(status.device_count, 0);
    }

    #[tokio::test]
    async fn test_model_operations_require_initialize() {
        let engine = MiningOptimizer::new(quick_config(), Arc::new(TracingSink));
        engine.register_device("cpu-1", DeviceInfo::default()).await.unwrap();

        assert!(matches!(engine.start().await, Err(EngineError::NotInitialized)));
        assert!(matches!(engine.get_optimization("cpu-1").await, Err(EngineError::NotInitialized)));
        assert!(matches!(engine.run_optimization_cycle().await, Err(EngineError::NotInitialized)));
        assert!(matches!(engine.export_model().await, Err(EngineError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let engine = MiningOptimizer::new(quick_config(), Arc::new(TracingSink));
        assert!(engine.initialize().await.unwrap());
        let first = engine.model().await.unwrap();

        assert!(engine.initialize().await.unwrap());
        assert_eq!(engine.model().await.unwrap(), first);
        assert_eq!(first.iterations, 3);
    }

    #[tokio::test]
    async fn test_get_optimization_unknown_device() {
        let engine = MiningOptimizer::new(quick_config(), Arc::new(TracingSink));
        engine.initialize().await.unwrap();
        assert!(matches!(
            engine.get_optimization("ghost").await,
            Err(EngineError::UnknownDevice(_))
        ));
    }

    #[tokio::test]
    async fn test_import_rejects_mismatched_topology() {
        let engine = MiningOptimizer::new(quick_config(), Arc::new(TracingSink));
        engine.initialize().await.unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let other = NeuralNetwork::new(
            3,
            &[(2, crate::optimizer::network::Activation::Linear)],
            0.01,
            0.0,
            &mut rng,
        );
        let json = other.to_json().unwrap();
        assert!(matches!(
            engine.import_model(&json).await,
            Err(EngineError::InvalidSnapshot(_))
        ));
    }

    #[tokio::test]
    async fn test_aborted_self_improvement_holds_training_lock() {
        let config = EngineConfig {
            improvement_epochs: 200_000,
            min_history_for_improvement: 1,
            ..quick_config()
        };
        let engine = MiningOptimizer::new(config, Arc::new(TracingSink));
        engine.initialize().await.unwrap();
        engine.register_device("gpu-1", DeviceInfo::default()).await.unwrap();
        engine.register_device("cpu-1", DeviceInfo::default()).await.unwrap();
        engine.run_optimization_cycle().await.unwrap();
        let iterations = engine.get_status().await.iterations;

        let shared = Arc::clone(&engine.shared);
        let cycle = tokio::spawn(async move { shared.self_improvement_cycle().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cycle.abort();
        assert!(cycle.await.unwrap_err().is_cancelled());

        // The detached training pass still owns the lock
        assert!(engine.shared.training.try_lock().is_err());

        let _training = engine.shared.training.lock().await;
        assert_eq!(engine.get_status().await.iterations, iterations);
        assert_eq!(engine.get_status().await.self_improvement_cycles, 0);
    }

    #[tokio::test]
    async fn test_initialize_with_empty_catalog() {
        let config = EngineConfig {
            profiles: Vec::new(),
            ..quick_config()
        };
        let engine = MiningOptimizer::new(config, Arc::new(TracingSink));
        assert!(engine.config().profiles.is_empty());
        assert!(engine.initialize().await.unwrap());

        let status = engine.get_status().await;
        assert!(status.initialized);
        assert_eq!(status.model_layers, 3);
        assert_eq!(status.iterations, 0);

        engine.register_device("gpu-1", DeviceInfo::default()).await.unwrap();
        assert_eq!(engine.run_optimization_cycle().await.unwrap(), 0);
        assert!(engine.get_optimization("gpu-1").await.unwrap().is_none());
    }
}
