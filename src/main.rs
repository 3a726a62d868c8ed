//! Main entry point for the fleet optimizer demo
//!
//! Boots the engine, registers a small mixed fleet, and lets both periodic
//! cycles run for a short while.

use anyhow::Result;
use fleet_optimizer::optimizer::{
    CloudMinerConnection, DeviceInfo, EngineEvent, MiningStateUpdate, PerformanceCollector,
};
use fleet_optimizer::{EngineBuilder, EngineConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "FLEET_OPTIMIZER_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting fleet optimizer demo");

    let config = load_config()?;
    let collector = PerformanceCollector::new();
    let optimizer = EngineBuilder::from_config(config).build(Arc::new(collector.clone()));

    info!(
        "Optimization every {:?}, self-improvement every {:?}",
        optimizer.config().optimization_interval(),
        optimizer.config().self_improvement_interval()
    );

    optimizer.initialize().await?;
    let status = optimizer.get_status().await;
    info!(
        "Model ready: {} layers, accuracy {:.4}, {} iterations",
        status.model_layers, status.accuracy, status.iterations
    );

    register_demo_fleet(&optimizer).await?;

    let mut events = optimizer.subscribe();
    optimizer.start().await?;

    let watch = tokio::time::sleep(Duration::from_secs(3));
    tokio::pin!(watch);
    loop {
        tokio::select! {
            _ = &mut watch => break,
            event = events.recv() => match event {
                Ok(EngineEvent::Optimization { device_id, result }) => info!(
                    "{}: {:.1} H/s predicted, {} threads, intensity {}, {}",
                    device_id,
                    result.hashrate_prediction,
                    result.recommended_settings.threads,
                    result.recommended_settings.intensity,
                    result.recommended_settings.algorithm
                ),
                Ok(EngineEvent::SelfImprovement { previous_accuracy, new_accuracy, .. }) => info!(
                    "Model retrained: accuracy {:.4} -> {:.4}",
                    previous_accuracy, new_accuracy
                ),
                Ok(other) => info!("Engine event: {:?}", other),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} engine events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    optimizer.stop().await?;

    let status = optimizer.get_status().await;
    let performance = collector.get_snapshot().await;
    info!(
        "Demo completed: {} devices, {} self-improvement cycles, {} performance reports, fleet hashrate {:.1}",
        status.device_count,
        status.self_improvement_cycles,
        performance.total_reports,
        performance.fleet_hashrate
    );

    Ok(())
}

/// Config from the first CLI argument or `FLEET_OPTIMIZER_CONFIG`; otherwise
/// defaults with periods short enough to watch.
fn load_config() -> Result<EngineConfig> {
    let path = std::env::args().nth(1).or_else(|| std::env::var(CONFIG_ENV).ok());
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            EngineConfig::from_json_file(path)
        }
        None => Ok(EngineBuilder::new()
            .with_intervals(Duration::from_millis(500), Duration::from_millis(1200))
            .with_bootstrap(300, 50)
            .with_self_improvement(20, 10)
            .build_config()),
    }
}

async fn register_demo_fleet(optimizer: &fleet_optimizer::MiningOptimizer) -> Result<()> {
    optimizer.register_device("cpu-rig-1", DeviceInfo::default()).await?;
    optimizer
        .register_device(
            "gpu-rig-1",
            DeviceInfo {
                algorithm: Some("kawpow".to_string()),
                hashrate: Some(42_000.0),
                pool: Some("stratum+tcp://pool.example:3333".to_string()),
                ..DeviceInfo::default()
            },
        )
        .await?;
    optimizer
        .register_device(
            "asic-rack-1",
            DeviceInfo {
                algorithm: Some("sha256".to_string()),
                difficulty: Some(8000.0),
                power: Some(3250.0),
                efficiency: Some(0.93),
                ..DeviceInfo::default()
            },
        )
        .await?;

    optimizer
        .update_mining_state(
            "gpu-rig-1",
            MiningStateUpdate {
                shares: Some(120),
                accepted: Some(115),
                rejected: Some(5),
                temperature_c: Some(68.0),
                ..MiningStateUpdate::default()
            },
        )
        .await?;

    optimizer
        .connect_cloud_miner(CloudMinerConnection {
            name: "cloud-gpu-1".to_string(),
            pool: "stratum+tcp://cloud.example:4444".to_string(),
            worker: "fleet.cloud1".to_string(),
            algorithm: "ethash".to_string(),
            hashrate: 95_000.0,
            efficiency: 0.8,
        })
        .await?;

    Ok(())
}
