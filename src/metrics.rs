//! Metrics (C6): per-message counters and per-stage latency histograms.
//!
//! Counters are exported to the global `metrics` recorder (scraped by
//! whatever exporter `main` installs); the histograms additionally keep a
//! local, lock-protected summary so the consumer loop can log a periodic
//! one-line digest without depending on a running exporter.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::info;

/// Logarithmic bucket boundaries in microseconds, covering 1μs-10s with
/// ~10% relative error per bucket.
static BUCKET_BOUNDS_US: &[u64] = &[
    1, 2, 5, 10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000,
    200_000, 500_000, 1_000_000, 2_000_000, 5_000_000, 10_000_000, u64::MAX,
];

#[derive(Debug)]
struct HistogramInner {
    buckets: Vec<u64>,
    count: u64,
    sum_us: u64,
    max_us: u64,
}

/// A single-stage latency histogram. Not a general-purpose utility — sized
/// for the three pipeline stages this engine times.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: Mutex<HistogramInner>,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HistogramInner {
                buckets: vec![0u64; BUCKET_BOUNDS_US.len()],
                count: 0,
                sum_us: 0,
                max_us: 0,
            }),
        }
    }
}

impl LatencyHistogram {
    pub fn record(&self, latency_us: u64) {
        let mut inner = self.inner.lock();
        inner.count += 1;
        inner.sum_us = inner.sum_us.saturating_add(latency_us);
        inner.max_us = inner.max_us.max(latency_us);
        let idx = BUCKET_BOUNDS_US.partition_point(|&bound| bound < latency_us);
        let idx = idx.min(inner.buckets.len() - 1);
        inner.buckets[idx] += 1;
    }

    pub fn record_duration(&self, duration: std::time::Duration) {
        self.record(duration.as_micros() as u64);
    }

    pub fn percentile(&self, p: f64) -> u64 {
        let inner = self.inner.lock();
        if inner.count == 0 {
            return 0;
        }
        let target = ((p / 100.0) * inner.count as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, &bucket_count) in inner.buckets.iter().enumerate() {
            cumulative += bucket_count;
            if cumulative >= target {
                return BUCKET_BOUNDS_US[i];
            }
        }
        inner.max_us
    }

    pub fn p50(&self) -> u64 {
        self.percentile(50.0)
    }

    pub fn p99(&self) -> u64 {
        self.percentile(99.0)
    }

    pub fn mean_us(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.count == 0 {
            0.0
        } else {
            inner.sum_us as f64 / inner.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }
}

/// Pipeline-wide metrics: one instance shared across the consumer loop.
#[derive(Default)]
pub struct Metrics {
    pub messages_processed: AtomicU64,
    pub messages_failed: AtomicU64,
    pub extract_latency: LatencyHistogram,
    pub store_update_latency: LatencyHistogram,
    pub total_latency: LatencyHistogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("fraud_engine_messages_processed_total").increment(1);
    }

    pub fn record_failed(&self, reason: &'static str) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("fraud_engine_messages_failed_total", "reason" => reason).increment(1);
    }

    pub fn record_extract(&self, duration: std::time::Duration) {
        self.extract_latency.record_duration(duration);
        metrics::histogram!("fraud_engine_extract_latency_us").record(duration.as_micros() as f64);
    }

    pub fn record_store_update(&self, duration: std::time::Duration) {
        self.store_update_latency.record_duration(duration);
        metrics::histogram!("fraud_engine_store_update_latency_us")
            .record(duration.as_micros() as f64);
    }

    pub fn record_total(&self, duration: std::time::Duration) {
        self.total_latency.record_duration(duration);
        metrics::histogram!("fraud_engine_total_latency_us").record(duration.as_micros() as f64);
    }

    /// Log a one-line digest. Called every `stats_print_interval` messages
    /// and once more on shutdown.
    pub fn log_summary(&self) {
        info!(
            processed = self.messages_processed.load(Ordering::Relaxed),
            failed = self.messages_failed.load(Ordering::Relaxed),
            extract_p50_us = self.extract_latency.p50(),
            extract_p99_us = self.extract_latency.p99(),
            store_update_p50_us = self.store_update_latency.p50(),
            store_update_p99_us = self.store_update_latency.p99(),
            total_p50_us = self.total_latency.p50(),
            total_p99_us = self.total_latency.p99(),
            "pipeline summary",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_tracks_percentiles() {
        let h = LatencyHistogram::default();
        for i in 1..=100 {
            h.record(i * 10);
        }
        assert_eq!(h.count(), 100);
        assert!(h.p99() >= h.p50());
    }

    #[test]
    fn empty_histogram_reports_zero() {
        let h = LatencyHistogram::default();
        assert_eq!(h.count(), 0);
        assert_eq!(h.p50(), 0);
        assert_eq!(h.mean_us(), 0.0);
    }

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_processed();
        metrics.record_processed();
        metrics.record_failed("schema");
        assert_eq!(metrics.messages_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.messages_failed.load(Ordering::Relaxed), 1);
    }
}
