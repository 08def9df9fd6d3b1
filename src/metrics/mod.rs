//! Metrics for the founding spots engine
//!
//! A small in-process registry of counters and latency histograms,
//! exported as JSON or Prometheus text on `/metrics`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Global metrics registry
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Increment a counter
    pub async fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1).await;
    }

    /// Add to a counter
    pub async fn add_counter(&self, name: &str, value: u64) {
        let counters = self.counters.read().await;
        if let Some(counter) = counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        drop(counters);

        let mut counters = self.counters.write().await;
        counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Count a business-rule rejection under its reason tag.
    pub async fn record_rejection(&self, reason: &str) {
        self.inc_counter(metric_names::REJECTIONS_TOTAL).await;
        self.inc_counter(&format!("{}.{reason}", metric_names::REJECTIONS))
            .await;
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let counters = self.counters.read().await;
        counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Record a histogram observation (seconds)
    pub async fn observe_histogram(&self, name: &str, value: f64) {
        let histograms = self.histograms.read().await;
        if let Some(histogram) = histograms.get(name) {
            histogram.observe(value);
            return;
        }
        drop(histograms);

        let mut histograms = self.histograms.write().await;
        histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::default()))
            .observe(value);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get all metrics as JSON
    pub async fn to_json(&self) -> serde_json::Value {
        let counters = self.counters.read().await;
        let histograms = self.histograms.read().await;

        let counter_values: BTreeMap<&str, u64> = counters
            .iter()
            .map(|(k, v)| (k.as_str(), v.load(Ordering::Relaxed)))
            .collect();
        let histogram_values: BTreeMap<&str, serde_json::Value> = histograms
            .iter()
            .map(|(k, h)| (k.as_str(), h.to_json()))
            .collect();

        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "counters": counter_values,
            "histograms": histogram_values,
        })
    }

    /// Export metrics in Prometheus text format, sorted by metric name.
    pub async fn to_prometheus(&self) -> String {
        let counters = self.counters.read().await;
        let histograms = self.histograms.read().await;

        let mut output = String::new();

        output.push_str("# HELP promo_uptime_seconds Time since service start\n");
        output.push_str("# TYPE promo_uptime_seconds gauge\n");
        output.push_str(&format!("promo_uptime_seconds {}\n\n", self.uptime_seconds()));

        let sorted: BTreeMap<_, _> = counters.iter().collect();
        for (name, counter) in sorted {
            let name = prometheus_name(name);
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {}\n", counter.load(Ordering::Relaxed)));
        }

        let sorted: BTreeMap<_, _> = histograms.iter().collect();
        for (name, histogram) in sorted {
            output.push_str(&histogram.to_prometheus(name));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn prometheus_name(name: &str) -> String {
    name.replace(['.', '-'], "_")
}

/// Fixed-bucket histogram. Sums are kept in microseconds.
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.sum_micros
            .fetch_add((value * 1_000_000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        if let Some(i) = self.buckets.iter().position(|bound| value <= *bound) {
            self.counts[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn sum_seconds(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn to_json(&self) -> serde_json::Value {
        let bucket_counts: Vec<u64> = self
            .counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();

        serde_json::json!({
            "buckets": self.buckets,
            "counts": bucket_counts,
            "sum": self.sum_seconds(),
            "count": self.count(),
        })
    }

    pub fn to_prometheus(&self, name: &str) -> String {
        let name = prometheus_name(name);
        let mut output = format!("# TYPE {name} histogram\n");

        let mut cumulative = 0u64;
        for (bound, count) in self.buckets.iter().zip(&self.counts) {
            cumulative += count.load(Ordering::Relaxed);
            output.push_str(&format!("{name}_bucket{{le=\"{bound}\"}} {cumulative}\n"));
        }

        output.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {}\n", self.count()));
        output.push_str(&format!("{name}_sum {}\n", self.sum_seconds()));
        output.push_str(&format!("{name}_count {}\n", self.count()));
        output
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // Latency in seconds
        Self::new(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ])
    }
}

/// Predefined metric names
pub mod metric_names {
    pub const VALIDATIONS: &str = "promo.validations";
    pub const VALIDATIONS_ELIGIBLE: &str = "promo.validations.eligible";

    pub const REDEMPTIONS_ATTEMPTED: &str = "promo.redemptions.attempted";
    pub const REDEMPTIONS_SUCCEEDED: &str = "promo.redemptions.succeeded";

    /// Prefix; the rejection reason tag is appended.
    pub const REJECTIONS: &str = "promo.rejections";
    pub const REJECTIONS_TOTAL: &str = "promo.rejections.total";

    pub const ALLOCATION_CONFLICTS: &str = "promo.allocation.conflicts";
    pub const ALLOCATION_RETRIES_EXHAUSTED: &str = "promo.allocation.retries_exhausted";
    pub const ALLOCATION_TIMEOUTS: &str = "promo.allocation.timeouts";
    pub const PROJECTION_FAILURES: &str = "promo.profile_projection.failures";

    pub const DATASTORE_ERRORS: &str = "promo.errors.datastore";

    pub const REDEEM_LATENCY: &str = "promo.redeem.latency_seconds";
    pub const ALLOCATE_LATENCY: &str = "promo.allocate.latency_seconds";
}

/// Time an async operation into a histogram
pub async fn timed<F, T>(metrics: &MetricsRegistry, metric_name: &str, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = f.await;
    metrics
        .observe_histogram(metric_name, start.elapsed().as_secs_f64())
        .await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter() {
        let registry = MetricsRegistry::new();

        registry.inc_counter(metric_names::REDEMPTIONS_ATTEMPTED).await;
        registry.inc_counter(metric_names::REDEMPTIONS_ATTEMPTED).await;
        registry.add_counter(metric_names::REDEMPTIONS_ATTEMPTED, 3).await;

        assert_eq!(
            registry.get_counter(metric_names::REDEMPTIONS_ATTEMPTED).await,
            5
        );
        assert_eq!(registry.get_counter("never.touched").await, 0);
    }

    #[tokio::test]
    async fn test_record_rejection() {
        let registry = MetricsRegistry::new();

        registry.record_rejection("exhausted").await;
        registry.record_rejection("exhausted").await;
        registry.record_rejection("expired").await;

        assert_eq!(registry.get_counter("promo.rejections.exhausted").await, 2);
        assert_eq!(registry.get_counter("promo.rejections.expired").await, 1);
        assert_eq!(registry.get_counter(metric_names::REJECTIONS_TOTAL).await, 3);
    }

    #[tokio::test]
    async fn test_histogram_buckets() {
        let registry = MetricsRegistry::new();

        timed(&registry, metric_names::REDEEM_LATENCY, async {}).await;
        registry
            .observe_histogram(metric_names::REDEEM_LATENCY, 0.2)
            .await;
        registry
            .observe_histogram(metric_names::REDEEM_LATENCY, 60.0)
            .await;

        let json = registry.to_json().await;
        let latency = &json["histograms"][metric_names::REDEEM_LATENCY];
        assert_eq!(latency["count"].as_u64(), Some(3));

        let text = registry.to_prometheus().await;
        assert!(text.contains("promo_redeem_latency_seconds_bucket{le=\"0.25\"} 2"));
        assert!(text.contains("promo_redeem_latency_seconds_bucket{le=\"+Inf\"} 3"));
    }

    #[tokio::test]
    async fn test_prometheus_format() {
        let registry = MetricsRegistry::new();

        registry.inc_counter(metric_names::REDEMPTIONS_SUCCEEDED).await;

        let text = registry.to_prometheus().await;
        assert!(text.contains("# TYPE promo_redemptions_succeeded counter"));
        assert!(text.contains("promo_redemptions_succeeded 1"));
        assert!(text.starts_with("# HELP promo_uptime_seconds"));
    }
}
