//! Pool configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Worker count when nothing valid is configured.
pub const DEFAULT_POOL_SIZE: usize = 4;
/// Split submissions into jobs of at most this many sets.
pub const MAX_SIGNATURE_SETS_PER_JOB: usize = 128;
/// Flush the buffer as soon as it holds more sets than this.
pub const MAX_BUFFERED_SIGS: usize = 32;
/// Flush the buffer at the latest this long after its first job.
pub const MAX_BUFFER_WAIT_MS: u64 = 100;
/// `can_accept_work` turns false once the ready queue reaches this length.
pub const MAX_JOBS_CAN_ACCEPT_WORK: usize = 512;
/// Smallest number of requests worth one batch check.
pub const BATCHABLE_MIN_PER_CHUNK: usize = 16;

/// Configuration for the verification pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads and of concurrent dispatch rounds
    pub pool_size: usize,

    /// Route `verify_on_main_thread` calls through the queue as well
    pub verify_all_in_queue: bool,

    /// Blind every same-message job, whatever its options say
    pub add_verification_randomness: bool,

    pub max_signature_sets_per_job: usize,

    pub max_buffered_sigs: usize,

    pub max_buffer_wait_ms: u64,

    pub max_jobs_can_accept_work: usize,

    pub batchable_min_per_chunk: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            verify_all_in_queue: false,
            add_verification_randomness: false,
            max_signature_sets_per_job: MAX_SIGNATURE_SETS_PER_JOB,
            max_buffered_sigs: MAX_BUFFERED_SIGS,
            max_buffer_wait_ms: MAX_BUFFER_WAIT_MS,
            max_jobs_can_accept_work: MAX_JOBS_CAN_ACCEPT_WORK,
            batchable_min_per_chunk: BATCHABLE_MIN_PER_CHUNK,
        }
    }
}

impl PoolConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BLS_THREADPOOL_SIZE` or `UV_THREADPOOL_SIZE`: Worker count (default: 4, also when 0 or invalid)
    /// - `BLS_VERIFY_ALL_IN_QUEUE`: Queue main-thread calls too (default: false)
    /// - `BLS_ADD_VERIFICATION_RANDOMNESS`: Blind all same-message jobs (default: false)
    /// - `BLS_MAX_BUFFER_WAIT_MS`: Buffer flush deadline (default: 100)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |name: &str| {
            lookup(name)
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false)
        };

        Self {
            pool_size: lookup("BLS_THREADPOOL_SIZE")
                .or_else(|| lookup("UV_THREADPOOL_SIZE"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_POOL_SIZE),

            verify_all_in_queue: flag("BLS_VERIFY_ALL_IN_QUEUE"),

            add_verification_randomness: flag("BLS_ADD_VERIFICATION_RANDOMNESS"),

            max_buffer_wait_ms: lookup("BLS_MAX_BUFFER_WAIT_MS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(MAX_BUFFER_WAIT_MS),

            ..defaults
        }
    }

    /// Same configuration with a different worker count.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }
}
