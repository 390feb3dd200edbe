//! Request counters and inference latency tracking for the classifier service.

use crate::auth::AuthError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Keep at most this many latency samples
const MAX_SAMPLES: usize = 10_000;

/// Metrics collector shared by all handlers
pub struct ServiceMetrics {
    pub predictions_served: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub logins_succeeded: AtomicU64,
    pub logins_failed: AtomicU64,
    pub auth_missing: AtomicU64,
    pub auth_invalid: AtomicU64,
    pub auth_expired: AtomicU64,
    pub invalid_inputs: AtomicU64,
    pub internal_errors: AtomicU64,
    /// Fresh inference times (in microseconds)
    inference_times: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            logins_succeeded: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            auth_missing: AtomicU64::new(0),
            auth_invalid: AtomicU64::new(0),
            auth_expired: AtomicU64::new(0),
            invalid_inputs: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            inference_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a completed prediction
    pub fn record_prediction(&self, cache_hit: bool) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record how long a model call took
    pub fn record_inference_time(&self, duration: Duration) {
        if let Ok(mut times) = self.inference_times.write() {
            times.push(duration.as_micros() as u64);
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }
    }

    pub fn record_login(&self, success: bool) {
        let counter = if success {
            &self.logins_succeeded
        } else {
            &self.logins_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self, error: AuthError) {
        let counter = match error {
            AuthError::Missing => &self.auth_missing,
            AuthError::Invalid => &self.auth_invalid,
            AuthError::Expired => &self.auth_expired,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_input(&self) {
        self.invalid_inputs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_internal_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Inference latency statistics
    pub fn get_inference_stats(&self) -> LatencyStats {
        let times = match self.inference_times.read() {
            Ok(times) => times,
            Err(_) => return LatencyStats::default(),
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }

    /// Share of predictions answered from the cache, 0.0 when none were served
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = self.predictions_served.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Log a one-shot summary
    pub fn print_summary(&self) {
        let inference = self.get_inference_stats();
        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            predictions = self.predictions_served.load(Ordering::Relaxed),
            cache_hits = self.cache_hits.load(Ordering::Relaxed),
            cache_misses = self.cache_misses.load(Ordering::Relaxed),
            cache_hit_rate = format!("{:.1}%", self.cache_hit_rate() * 100.0),
            logins_ok = self.logins_succeeded.load(Ordering::Relaxed),
            logins_failed = self.logins_failed.load(Ordering::Relaxed),
            auth_missing = self.auth_missing.load(Ordering::Relaxed),
            auth_invalid = self.auth_invalid.load(Ordering::Relaxed),
            auth_expired = self.auth_expired.load(Ordering::Relaxed),
            invalid_inputs = self.invalid_inputs.load(Ordering::Relaxed),
            internal_errors = self.internal_errors.load(Ordering::Relaxed),
            inference_mean_us = inference.mean_us,
            inference_p50_us = inference.p50_us,
            inference_p99_us = inference.p99_us,
            "Service metrics summary"
        );
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics summary logger
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
