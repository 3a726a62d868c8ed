//! Reporting sinks for aggregate device performance.
//!
//! The engine pushes one `(label, hashrate, efficiency)` report per optimized
//! device per cycle, plus one when a cloud miner is connected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Receiver of aggregate performance numbers.
#[async_trait]
pub trait PerformanceSink: Send + Sync {
    async fn report_performance(&self, label: &str, hashrate: f64, efficiency: f64);
}

/// Sink that only logs each report.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl PerformanceSink for TracingSink {
    async fn report_performance(&self, label: &str, hashrate: f64, efficiency: f64) {
        info!(
            "Performance report for {}: hashrate {:.2}, efficiency {:.3}",
            label, hashrate, efficiency
        );
    }
}

/// Most recent report for one label.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReading {
    pub hashrate: f64,
    pub efficiency: f64,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CollectedReports {
    latest: HashMap<String, PerformanceReading>,
    report_counts: HashMap<String, u64>,
    total_reports: u64,
}

/// Snapshot of everything a [`PerformanceCollector`] has received.
#[derive(Debug, Clone)]
pub struct PerformanceSnapshot {
    pub latest: HashMap<String, PerformanceReading>,
    pub report_counts: HashMap<String, u64>,
    pub total_reports: u64,
    /// Sum of the latest hashrate of every label
    pub fleet_hashrate: f64,
}

/// In-memory sink keeping the latest reading and a report counter per label.
#[derive(Debug, Default, Clone)]
pub struct PerformanceCollector {
    reports: Arc<RwLock<CollectedReports>>,
}

impl PerformanceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_snapshot(&self) -> PerformanceSnapshot {
        let reports = self.reports.read().await;
        PerformanceSnapshot {
            latest: reports.latest.clone(),
            report_counts: reports.report_counts.clone(),
            total_reports: reports.total_reports,
            fleet_hashrate: reports.latest.values().map(|r| r.hashrate).sum(),
        }
    }

    pub async fn reading(&self, label: &str) -> Option<PerformanceReading> {
        self.reports.read().await.latest.get(label).cloned()
    }
}

#[async_trait]
impl PerformanceSink for PerformanceCollector {
    #[instrument(skip(self), fields(label = %label))]
    async fn report_performance(&self, label: &str, hashrate: f64, efficiency: f64) {
        let mut reports = self.reports.write().await;
        reports.latest.insert(
            label.to_string(),
            PerformanceReading {
                hashrate,
                efficiency,
                reported_at: Utc::now(),
            },
        );
        *reports.report_counts.entry(label.to_string()).or_insert(0) += 1;
        reports.total_reports += 1;

        debug!("Recorded performance for {}: {:.2} H/s, {:.3}", label, hashrate, efficiency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collector_starts_empty() {
        let collector = PerformanceCollector::new();
        let snapshot = collector.get_snapshot().await;
        assert!(snapshot.latest.is_empty());
        assert_eq!(snapshot.total_reports, 0);
        assert_eq!(snapshot.fleet_hashrate, 0.0);
    }

    #[tokio::test]
    async fn test_collector_keeps_latest_per_label() {
        let collector = PerformanceCollector::new();
        collector.report_performance("gpu-1", 120.0, 0.7).await;
        collector.report_performance("gpu-1", 150.0, 0.8).await;
        collector.report_performance("cpu-1", 10.0, 0.9).await;

        let snapshot = collector.get_snapshot().await;
        assert_eq!(snapshot.total_reports, 3);
        assert_eq!(snapshot.report_counts.get("gpu-1"), Some(&2));
        assert_eq!(snapshot.fleet_hashrate, 160.0);

        let reading = collector.reading("gpu-1").await.unwrap();
        assert_eq!(reading.hashrate, 150.0);
        assert_eq!(reading.efficiency, 0.8);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_reports() {
        let sink: Arc<dyn PerformanceSink> = Arc::new(TracingSink);
        sink.report_performance("asic-1", 1000.0, 0.95).await;
    }
}
