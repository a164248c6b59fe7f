//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time metrics for a pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total successful borrows.
    pub total_borrowed: u64,

    /// Total members accepted back (parked or destroyed on return).
    pub total_returned: u64,

    /// Total members created by the factory.
    pub total_created: u64,

    /// Total members destroyed, for any reason.
    pub total_destroyed: u64,

    /// Members destroyed by the evictor for staleness.
    pub total_evicted: u64,

    /// Validation rejections across borrow, return, and idle testing.
    pub validation_failures: u64,

    /// Borrows that gave up after `max_wait_millis`.
    pub borrow_timeouts: u64,

    /// Members currently checked out.
    pub num_active: usize,

    /// Members currently parked idle.
    pub num_idle: usize,
}

impl PoolMetrics {
    /// Export metrics as a string map.
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("total_evicted".to_string(), self.total_evicted.to_string());
        metrics.insert(
            "validation_failures".to_string(),
            self.validation_failures.to_string(),
        );
        metrics.insert("borrow_timeouts".to_string(), self.borrow_timeouts.to_string());
        metrics.insert("num_active".to_string(), self.num_active.to_string());
        metrics.insert("num_idle".to_string(), self.num_idle.to_string());
        metrics
    }
}

/// Prometheus exposition-format exporter.
pub struct MetricsExporter;

impl MetricsExporter {
    /// Render a metrics snapshot in Prometheus exposition format.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        output.push_str("# HELP genpool_objects_active Members currently checked out\n");
        output.push_str("# TYPE genpool_objects_active gauge\n");
        output.push_str(&format!(
            "genpool_objects_active{{{}}} {}\n",
            labels, metrics.num_active
        ));

        output.push_str("# HELP genpool_objects_idle Members currently parked idle\n");
        output.push_str("# TYPE genpool_objects_idle gauge\n");
        output.push_str(&format!(
            "genpool_objects_idle{{{}}} {}\n",
            labels, metrics.num_idle
        ));

        output.push_str("# HELP genpool_borrowed_total Total successful borrows\n");
        output.push_str("# TYPE genpool_borrowed_total counter\n");
        output.push_str(&format!(
            "genpool_borrowed_total{{{}}} {}\n",
            labels, metrics.total_borrowed
        ));

        output.push_str("# HELP genpool_returned_total Total members returned\n");
        output.push_str("# TYPE genpool_returned_total counter\n");
        output.push_str(&format!(
            "genpool_returned_total{{{}}} {}\n",
            labels, metrics.total_returned
        ));

        output.push_str("# HELP genpool_created_total Total members created\n");
        output.push_str("# TYPE genpool_created_total counter\n");
        output.push_str(&format!(
            "genpool_created_total{{{}}} {}\n",
            labels, metrics.total_created
        ));

        output.push_str("# HELP genpool_destroyed_total Total members destroyed\n");
        output.push_str("# TYPE genpool_destroyed_total counter\n");
        output.push_str(&format!(
            "genpool_destroyed_total{{{}}} {}\n",
            labels, metrics.total_destroyed
        ));

        output.push_str("# HELP genpool_evicted_total Members destroyed by the evictor\n");
        output.push_str("# TYPE genpool_evicted_total counter\n");
        output.push_str(&format!(
            "genpool_evicted_total{{{}}} {}\n",
            labels, metrics.total_evicted
        ));

        output.push_str("# HELP genpool_validation_failures_total Validation rejections\n");
        output.push_str("# TYPE genpool_validation_failures_total counter\n");
        output.push_str(&format!(
            "genpool_validation_failures_total{{{}}} {}\n",
            labels, metrics.validation_failures
        ));

        output.push_str("# HELP genpool_borrow_timeouts_total Borrows that timed out\n");
        output.push_str("# TYPE genpool_borrow_timeouts_total counter\n");
        output.push_str(&format!(
            "genpool_borrow_timeouts_total{{{}}} {}\n",
            labels, metrics.borrow_timeouts
        ));

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }
        labels.join(",")
    }
}

/// Internal counters, bumped on the pool's hot paths.
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_borrowed: AtomicU64,
    pub total_returned: AtomicU64,
    pub total_created: AtomicU64,
    pub total_destroyed: AtomicU64,
    pub total_evicted: AtomicU64,
    pub validation_failures: AtomicU64,
    pub borrow_timeouts: AtomicU64,
}

impl MetricsTracker {
    pub fn snapshot(&self, num_active: usize, num_idle: usize) -> PoolMetrics {
        PoolMetrics {
            total_borrowed: self.total_borrowed.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_destroyed: self.total_destroyed.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            borrow_timeouts: self.borrow_timeouts.load(Ordering::Relaxed),
            num_active,
            num_idle,
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
