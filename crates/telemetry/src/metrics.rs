//! Internal metrics collection.
//!
//! Counters live in-process and a snapshot is logged after every retention
//! sweep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for statement latency.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the bridge.
#[derive(Debug, Default)]
pub struct Metrics {
    // Bus
    pub messages_received: Counter,
    pub subscription_failures: Counter,
    pub connection_errors: Counter,

    // Pipeline outcomes
    pub values_written: Counter,
    pub values_unchanged: Counter,
    pub values_dropped: Counter,

    // Storage
    pub storage_errors: Counter,
    pub seen_topic_upserts: Counter,
    pub rows_expired: Counter,
    pub insert_latency_ms: Histogram,

    // Gauges
    pub seen_topics: Gauge,
    pub cached_series: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            messages_received: self.messages_received.get(),
            subscription_failures: self.subscription_failures.get(),
            connection_errors: self.connection_errors.get(),
            values_written: self.values_written.get(),
            values_unchanged: self.values_unchanged.get(),
            values_dropped: self.values_dropped.get(),
            storage_errors: self.storage_errors.get(),
            seen_topic_upserts: self.seen_topic_upserts.get(),
            rows_expired: self.rows_expired.get(),
            insert_latency_mean_ms: self.insert_latency_ms.mean(),
            insert_latency_buckets: self.insert_latency_ms.buckets(),
            seen_topics: self.seen_topics.get(),
            cached_series: self.cached_series.get(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub messages_received: u64,
    pub subscription_failures: u64,
    pub connection_errors: u64,
    pub values_written: u64,
    pub values_unchanged: u64,
    pub values_dropped: u64,
    pub storage_errors: u64,
    pub seen_topic_upserts: u64,
    pub rows_expired: u64,
    pub insert_latency_mean_ms: f64,
    /// `(upper bound ms, count)` pairs
    pub insert_latency_buckets: Vec<(u64, u64)>,
    pub seen_topics: u64,
    pub cached_series: u64,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
