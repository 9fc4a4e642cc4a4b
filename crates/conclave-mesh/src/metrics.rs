//! Metrics collection for bus operations
//!
//! Counters only; there is one bus per session so no labels are needed.

use std::sync::Arc;
use tokio::sync::RwLock;

/// Point-in-time bus counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshMetrics {
    /// Messages appended to the log
    pub appends_total: u64,
    /// Cursors handed out by `read_since`
    pub reads_total: u64,
    /// Appends rejected because the bus was closed
    pub rejected_appends_total: u64,
    /// Live subscriptions opened
    pub subscribers_total: u64,
}

/// Shared, cloneable metrics recorder
#[derive(Debug, Clone, Default)]
pub struct MeshMetricsCollector {
    metrics: Arc<RwLock<MeshMetrics>>,
}

impl MeshMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_append(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.appends_total = metrics.appends_total.saturating_add(1);
    }

    pub async fn record_read(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.reads_total = metrics.reads_total.saturating_add(1);
    }

    pub async fn record_rejected_append(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.rejected_appends_total = metrics.rejected_appends_total.saturating_add(1);
    }

    pub async fn record_subscriber(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.subscribers_total = metrics.subscribers_total.saturating_add(1);
    }

    pub async fn snapshot(&self) -> MeshMetrics {
        *self.metrics.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_accumulate() {
        let collector = MeshMetricsCollector::new();
        collector.record_append().await;
        collector.record_append().await;
        collector.record_rejected_append().await;

        let snapshot = collector.snapshot().await;
        assert_eq!(snapshot.appends_total, 2);
        assert_eq!(snapshot.rejected_appends_total, 1);
        assert_eq!(snapshot.reads_total, 0);
    }
}
