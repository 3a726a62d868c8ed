//! Periodic optimization and self-improvement cycles.
//!
//! Each cycle runs in its own task on its own interval. The first tick fires
//! one full period after start. Dropping out of `Running` aborts both tasks.

use crate::optimizer::engine::EngineShared;
use crate::optimizer::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Handles of the running cycle tasks.
pub(crate) struct CycleScheduler {
    optimization: JoinHandle<()>,
    improvement: Option<JoinHandle<()>>,
}

impl CycleScheduler {
    pub(crate) fn spawn(shared: Arc<EngineShared>) -> Self {
        let optimization = tokio::spawn(run_optimization_loop(
            Arc::clone(&shared),
            shared.config.optimization_interval(),
        ));

        let improvement = if shared.config.self_improvement_enabled {
            let period = shared.config.self_improvement_interval();
            Some(tokio::spawn(run_self_improvement_loop(shared, period)))
        } else {
            info!("Self-improvement disabled; only the optimization cycle is scheduled");
            None
        };

        Self {
            optimization,
            improvement,
        }
    }

    pub(crate) fn abort(&self) {
        self.optimization.abort();
        if let Some(improvement) = &self.improvement {
            improvement.abort();
        }
    }

    /// Abort both tasks and wait until they have actually ended.
    pub(crate) async fn shutdown(self) {
        self.abort();
        if let Err(e) = self.optimization.await {
            if !e.is_cancelled() {
                error!("Optimization task ended abnormally: {}", e);
            }
        }
        if let Some(improvement) = self.improvement {
            if let Err(e) = improvement.await {
                if !e.is_cancelled() {
                    error!("Self-improvement task ended abnormally: {}", e);
                }
            }
        }
    }
}

async fn run_optimization_loop(shared: Arc<EngineShared>, period: Duration) {
    info!("Optimization cycle running every {} s", period.as_secs_f64());
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match shared.optimization_cycle().await {
            Ok(count) => debug!("Scheduled optimization cycle scored {} devices", count),
            Err(e) => error!("Optimization cycle failed: {}", e),
        }
    }
}

async fn run_self_improvement_loop(shared: Arc<EngineShared>, period: Duration) {
    info!("Self-improvement cycle running every {} s", period.as_secs_f64());
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match shared.self_improvement_cycle().await {
            Ok(true) => debug!("Scheduled self-improvement updated the model"),
            Ok(false) => debug!("Scheduled self-improvement had nothing to learn from"),
            Err(EngineError::InsufficientTrainingData {
                available,
                required,
            }) => {
                info!(
                    "Self-improvement skipped: {} of {} required optimization results",
                    available, required
                );
            }
            Err(e) => warn!("Self-improvement cycle failed: {}", e),
        }
    }
}
