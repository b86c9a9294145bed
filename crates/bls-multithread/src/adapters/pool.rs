//! # Worker Runners
//!
//! `WorkerRunner` implementations: a dedicated rayon thread pool for
//! production, and an in-task runner for tests and single-threaded embedding.

use crate::config::PoolConfig;
use crate::domain::entities::{WorkBatchResult, WorkRequest};
use crate::domain::errors::VerificationError;
use crate::domain::runner::run_work_requests;
use crate::ports::outbound::{Verifier, WorkerRunner};
use async_trait::async_trait;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Runs work requests on a fixed-size rayon thread pool.
///
/// Each call occupies one pool thread for the whole group; the result comes
/// back to the awaiting task over a one-shot channel.
pub struct RayonWorkerPool<V: Verifier> {
    pool: ThreadPool,
    verifier: Arc<V>,
    pool_size: usize,
    batchable_min_per_chunk: usize,
}

impl<V: Verifier> RayonWorkerPool<V> {
    /// Build a pool of `config.pool_size` threads named `bls-worker-{i}`.
    ///
    /// # Errors
    /// * `Setup` - the threads could not be spawned
    pub fn new(verifier: Arc<V>, config: &PoolConfig) -> Result<Self, VerificationError> {
        let pool_size = config.pool_size.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .thread_name(|i| format!("bls-worker-{i}"))
            .panic_handler(|payload| {
                let err = VerificationError::from_panic(payload.as_ref());
                error!(error = %err, "[bls-pool] worker thread panicked");
            })
            .build()
            .map_err(|e| VerificationError::Setup(e.to_string()))?;

        debug!(pool_size, "[bls-pool] worker threads started");
        Ok(Self {
            pool,
            verifier,
            pool_size,
            batchable_min_per_chunk: config.batchable_min_per_chunk,
        })
    }
}

#[async_trait]
impl<V: Verifier> WorkerRunner<V> for RayonWorkerPool<V> {
    fn pool_size(&self) -> usize {
        self.pool_size
    }

    async fn run_work_requests(
        &self,
        requests: Vec<WorkRequest<V::PublicKey, V::Signature>>,
    ) -> Result<WorkBatchResult, VerificationError> {
        let (tx, rx) = oneshot::channel();
        let verifier = Arc::clone(&self.verifier);
        let min_per_chunk = self.batchable_min_per_chunk;

        self.pool.spawn(move || {
            let result = run_work_requests(verifier.as_ref(), &requests, min_per_chunk);
            if tx.send(result).is_err() {
                debug!("[bls-pool] round abandoned before worker finished");
            }
        });

        // A dropped sender means the worker died mid-round
        rx.await
            .map_err(|_| VerificationError::Worker("worker terminated".to_string()))
    }
}

/// Runs work requests directly on the awaiting task.
pub struct InlineWorkerRunner<V: Verifier> {
    verifier: Arc<V>,
    pool_size: usize,
    batchable_min_per_chunk: usize,
}

impl<V: Verifier> InlineWorkerRunner<V> {
    pub fn new(verifier: Arc<V>, config: &PoolConfig) -> Self {
        Self {
            verifier,
            pool_size: config.pool_size.max(1),
            batchable_min_per_chunk: config.batchable_min_per_chunk,
        }
    }
}

#[async_trait]
impl<V: Verifier> WorkerRunner<V> for InlineWorkerRunner<V> {
    fn pool_size(&self) -> usize {
        self.pool_size
    }

    async fn run_work_requests(
        &self,
        requests: Vec<WorkRequest<V::PublicKey, V::Signature>>,
    ) -> Result<WorkBatchResult, VerificationError> {
        Ok(run_work_requests(
            self.verifier.as_ref(),
            &requests,
            self.batchable_min_per_chunk,
        ))
    }
}
