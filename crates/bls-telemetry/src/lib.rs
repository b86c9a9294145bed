//! # BLS Telemetry
//!
//! Observability for the BLS verification pool.
//!
//! ## Components
//!
//! - **Logging**: `tracing` subscriber with env filter, JSON or pretty output
//! - **Metrics**: Prometheus counters, gauges and histograms per pool
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bls_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let metrics = init_telemetry(&TelemetryConfig::from_env())?;
//! // Hand `metrics` to the pool, scrape with `encode_metrics()`
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `bls-pool` | Service name in logs |
//! | `BLS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `BLS_JSON_LOGS` | `false` | JSON log lines |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};
pub use metrics::{
    encode_metrics, encode_registry, register_metrics, HistogramTimer, PoolMetrics, REGISTRY,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Install logging and register a fresh set of pool metrics globally.
///
/// Returns the metrics so they can be handed to the pool.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<PoolMetrics, TelemetryError> {
    // Metrics first
    let metrics = PoolMetrics::new()?;
    register_metrics(&metrics)?;

    init_logging(config)?;
    Ok(metrics)
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
