//! Prometheus metrics for the BLS verification pool.
//!
//! All metrics follow the naming convention: `bls_pool_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., batch_retries_total)
//! - **Gauge**: Value that can go up or down (e.g., queue_length)
//! - **Histogram**: Distribution of values (e.g., job_wait_time_seconds)
//!
//! A [`PoolMetrics`] records whether or not it is registered; registering
//! only makes it visible to a scrape.

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();
}

/// Metrics of one verification pool.
#[derive(Clone, Debug)]
pub struct PoolMetrics {
    /// Batches that failed and were re-verified set by set
    pub batch_retries: IntCounter,
    /// Sets confirmed valid by a successful batch
    pub batch_sigs_success: IntCounter,
    /// Jobs handed to a worker
    pub jobs_started: IntCounter,
    /// Time from submission to dispatch
    pub job_wait_time: Histogram,
    /// Time a dispatch round spends in the worker
    pub round_duration: Histogram,
    /// Jobs in the ready queue
    pub queue_length: IntGauge,
    /// Dispatch rounds in flight
    pub workers_busy: IntGauge,
    /// Calls verified in the caller's context
    pub main_thread_verifications: IntCounter,
    /// Same-message jobs split into single-pair jobs
    pub same_message_retries: IntCounter,
    /// Jobs settled with an error
    pub job_errors: IntCounter,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, TelemetryError> {
    IntCounter::new(name, help).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

fn gauge(name: &str, help: &str) -> Result<IntGauge, TelemetryError> {
    IntGauge::new(name, help).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

fn histogram(name: &str, help: &str, start: f64) -> Result<Histogram, TelemetryError> {
    let buckets = exponential_buckets(start, 2.0, 15)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

impl PoolMetrics {
    /// Create unregistered metrics.
    pub fn new() -> Result<Self, TelemetryError> {
        Ok(Self {
            batch_retries: counter(
                "bls_pool_batch_retries_total",
                "Batch verifications that failed and were retried individually",
            )?,
            batch_sigs_success: counter(
                "bls_pool_batch_sigs_success_total",
                "Signature sets verified valid by a successful batch",
            )?,
            jobs_started: counter(
                "bls_pool_jobs_started_total",
                "Jobs dispatched to a worker",
            )?,
            job_wait_time: histogram(
                "bls_pool_job_wait_time_seconds",
                "Time jobs spend queued before dispatch",
                0.0001,
            )?,
            round_duration: histogram(
                "bls_pool_round_duration_seconds",
                "Time a dispatch round spends in the worker",
                0.0001,
            )?,
            queue_length: gauge("bls_pool_queue_length", "Jobs waiting in the ready queue")?,
            workers_busy: gauge("bls_pool_workers_busy", "Dispatch rounds in flight")?,
            main_thread_verifications: counter(
                "bls_pool_main_thread_verifications_total",
                "Calls verified synchronously in the caller's context",
            )?,
            same_message_retries: counter(
                "bls_pool_same_message_retries_total",
                "Same-message jobs split into single-pair jobs",
            )?,
            job_errors: counter("bls_pool_job_errors_total", "Jobs settled with an error")?,
        })
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.batch_retries.clone()),
            Box::new(self.batch_sigs_success.clone()),
            Box::new(self.jobs_started.clone()),
            Box::new(self.job_wait_time.clone()),
            Box::new(self.round_duration.clone()),
            Box::new(self.queue_length.clone()),
            Box::new(self.workers_busy.clone()),
            Box::new(self.main_thread_verifications.clone()),
            Box::new(self.same_message_retries.clone()),
            Box::new(self.job_errors.clone()),
        ]
    }

    /// Register every metric with `registry`.
    pub fn register(&self, registry: &Registry) -> Result<(), TelemetryError> {
        for metric in self.collectors() {
            registry
                .register(metric)
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        }
        Ok(())
    }
}

/// Register pool metrics with the global registry.
pub fn register_metrics(metrics: &PoolMetrics) -> Result<(), TelemetryError> {
    metrics.register(&REGISTRY)
}

/// Encode the global registry as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY)
}

/// Encode `registry` as Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
