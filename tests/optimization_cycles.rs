//! Optimization and self-improvement cycle tests

use anyhow::Result;
use fleet_optimizer::optimizer::profiles::default_catalog;
use fleet_optimizer::optimizer::{DeviceInfo, EngineEvent, MiningStateUpdate, PerformanceCollector};
use fleet_optimizer::{EngineBuilder, EngineConfig, EngineError, HardwareType, MiningOptimizer};
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;

fn test_config() -> EngineConfig {
    EngineBuilder::new()
        .with_bootstrap(60, 5)
        .with_self_improvement(3, 10)
        .with_seed(1234)
        .build_config()
}

async fn fleet_engine(config: EngineConfig) -> Result<(MiningOptimizer, PerformanceCollector)> {
    let collector = PerformanceCollector::new();
    let optimizer = MiningOptimizer::new(config, Arc::new(collector.clone()));
    optimizer.initialize().await?;

    optimizer.register_device("cpu-node-1", DeviceInfo::default()).await?;
    optimizer
        .register_device(
            "gpu-node-1",
            DeviceInfo {
                algorithm: Some("kawpow".to_string()),
                ..DeviceInfo::default()
            },
        )
        .await?;
    optimizer
        .update_mining_state(
            "gpu-node-1",
            MiningStateUpdate {
                shares: Some(40),
                accepted: Some(36),
                rejected: Some(4),
                ..MiningStateUpdate::default()
            },
        )
        .await?;

    Ok((optimizer, collector))
}

#[tokio::test]
async fn test_cycle_outputs_are_bounded() -> Result<()> {
    let (optimizer, collector) = fleet_engine(test_config()).await?;

    assert_eq!(optimizer.run_optimization_cycle().await?, 2);

    let history = optimizer.optimization_history().await;
    assert_eq!(history.len(), 2);
    for entry in &history {
        let result = &entry.result;
        assert!((0.0..=1000.0).contains(&result.hashrate_prediction));
        assert!((0.0..=1.0).contains(&result.efficiency_prediction));
        assert!((0.0..=1.0).contains(&result.power_optimization));
        assert!((0.0..=1000.0).contains(&result.reward_prediction));
        assert!((0.0..=1.0).contains(&result.confidence));

        let settings = &result.recommended_settings;
        assert!(settings.threads >= 1);
        assert!((1..=20).contains(&settings.intensity));
        assert!(settings.memory_usage_percent <= 100);
    }

    let gpu = history
        .iter()
        .find(|entry| entry.device_id == "gpu-node-1")
        .ok_or_else(|| anyhow::anyhow!("gpu result missing"))?;
    assert!(HardwareType::Gpu
        .candidate_algorithms()
        .contains(&gpu.result.recommended_settings.algorithm.as_str()));
    assert!(gpu.result.recommended_settings.threads <= 32);

    assert_eq!(collector.get_snapshot().await.total_reports, 2);
    assert!(optimizer.get_status().await.last_optimization_time.is_some());
    Ok(())
}

#[tokio::test]
async fn test_history_is_bounded() -> Result<()> {
    let (optimizer, _collector) = fleet_engine(test_config()).await?;

    for _ in 0..60 {
        optimizer.run_optimization_cycle().await?;
    }

    let history = optimizer.optimization_history().await;
    assert_eq!(history.len(), 100);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].recorded_at <= pair[1].recorded_at));
    Ok(())
}

#[tokio::test]
async fn test_history_capacity_is_configurable() -> Result<()> {
    let config = EngineBuilder::from_config(test_config())
        .with_history_capacity(5)
        .build_config();
    let (optimizer, _collector) = fleet_engine(config).await?;

    for _ in 0..4 {
        optimizer.run_optimization_cycle().await?;
    }

    let history = optimizer.optimization_history().await;
    assert_eq!(history.len(), 5);
    // Two devices per cycle, ordered by id: the oldest survivor is the
    // gpu result of the second cycle
    assert_eq!(history[0].device_id, "gpu-node-1");
    assert_eq!(history[4].device_id, "gpu-node-1");
    Ok(())
}

#[tokio::test]
async fn test_device_without_profile_is_skipped() -> Result<()> {
    let asic_only = default_catalog()
        .into_iter()
        .filter(|profile| profile.hardware_type == HardwareType::Asic)
        .collect();
    let config = EngineBuilder::from_config(test_config())
        .with_profiles(asic_only)
        .build_config();

    let optimizer = MiningOptimizer::new(config, Arc::new(PerformanceCollector::new()));
    optimizer.initialize().await?;
    optimizer.register_device("unidentifiable-123", DeviceInfo::default()).await?;
    optimizer.register_device("asic-miner-1", DeviceInfo::default()).await?;

    let mut events = optimizer.subscribe();
    assert_eq!(optimizer.run_optimization_cycle().await?, 1);

    let mut optimized = Vec::new();
    loop {
        match events.try_recv() {
            Ok(EngineEvent::Optimization { device_id, .. }) => optimized.push(device_id),
            Ok(_) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
    assert_eq!(optimized, vec!["asic-miner-1".to_string()]);

    assert!(optimizer.get_optimization("unidentifiable-123").await?.is_none());
    assert!(optimizer.get_optimization("asic-miner-1").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_on_demand_optimization_has_no_side_effects() -> Result<()> {
    let (optimizer, collector) = fleet_engine(test_config()).await?;

    let result = optimizer.get_optimization("cpu-node-1").await?;
    assert!(result.is_some());
    assert!(optimizer.optimization_history().await.is_empty());
    assert_eq!(collector.get_snapshot().await.total_reports, 0);
    assert!(optimizer.get_status().await.last_optimization_time.is_none());
    Ok(())
}

#[tokio::test]
async fn test_self_improvement_requires_history() -> Result<()> {
    let (optimizer, _collector) = fleet_engine(test_config()).await?;
    optimizer.run_optimization_cycle().await?;
    let before = optimizer.get_status().await;

    let result = optimizer.run_self_improvement_cycle().await;
    assert!(matches!(
        result,
        Err(EngineError::InsufficientTrainingData {
            available: 2,
            required: 10
        })
    ));

    let after = optimizer.get_status().await;
    assert_eq!(after.iterations, before.iterations);
    assert_eq!(after.accuracy, before.accuracy);
    assert_eq!(after.self_improvement_cycles, 0);
    assert!(after.last_improvement_time.is_none());
    assert!(optimizer.accuracy_history().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_self_improvement_updates_model() -> Result<()> {
    let (optimizer, _collector) = fleet_engine(test_config()).await?;
    for _ in 0..5 {
        optimizer.run_optimization_cycle().await?;
    }
    let before = optimizer.get_status().await;
    let mut events = optimizer.subscribe();

    assert!(optimizer.run_self_improvement_cycle().await?);

    let after = optimizer.get_status().await;
    assert_eq!(after.self_improvement_cycles, 1);
    assert_eq!(after.iterations, before.iterations + 3);
    assert!(after.last_improvement_time.is_some());
    assert!((0.0..=1.0).contains(&after.accuracy));

    match events.try_recv()? {
        EngineEvent::SelfImprovement {
            previous_accuracy,
            new_accuracy,
            total_iterations,
        } => {
            assert_eq!(previous_accuracy, before.accuracy);
            assert_eq!(new_accuracy, after.accuracy);
            assert_eq!(total_iterations, after.iterations);
        }
        other => anyhow::bail!("unexpected event {:?}", other),
    }

    // Topology survives retraining
    let model = optimizer.model().await?;
    model.validate_shapes()?;
    assert_eq!(model.input_width, 10);
    assert_eq!(model.output_width(), 4);
    Ok(())
}

#[tokio::test]
async fn test_accuracy_history_is_bounded() -> Result<()> {
    let (optimizer, _collector) = fleet_engine(test_config()).await?;
    for _ in 0..5 {
        optimizer.run_optimization_cycle().await?;
    }

    for _ in 0..12 {
        assert!(optimizer.run_self_improvement_cycle().await?);
    }

    let accuracies = optimizer.accuracy_history().await;
    assert_eq!(accuracies.len(), 10);
    assert!(accuracies.iter().all(|a| (0.0..=1.0).contains(a)));
    assert_eq!(accuracies.last().copied(), Some(optimizer.get_status().await.accuracy));
    assert_eq!(optimizer.get_status().await.self_improvement_cycles, 12);
    Ok(())
}
