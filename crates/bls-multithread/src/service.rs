//! # BLS Verification Pool Service
//!
//! Application service that implements the `BlsVerificationApi` trait.
//!
//! ## Architecture
//!
//! This is the hexagonal "application service" that:
//! - Implements the inbound port (`BlsVerificationApi`)
//! - Hands groups of work requests to the outbound `WorkerRunner` port
//! - Delegates job preparation and verification semantics to the domain layer
//!
//! ## Flow
//!
//! ```text
//! caller ──▶ job ──▶ buffer (batchable only) ──▶ ready queue ──▶ dispatch tick
//!                        │ flush on timer or                        │
//!                        └─ on sig_count overflow                   ▼
//!   caller ◀── oneshot ◀── settle by position ◀── WorkerRunner ◀── requests
//! ```
//!
//! Queue and buffer sit behind one mutex that is never held across an await.
//! A semaphore with `pool_size` permits bounds the rounds in flight.

use crate::adapters::pool::RayonWorkerPool;
use crate::config::PoolConfig;
use crate::domain::chunk::chunkify_maximize_chunk_size;
use crate::domain::entities::{SameMessagePair, SignatureSet, VerifyOptions};
use crate::domain::errors::VerificationError;
use crate::domain::job::{prepare_work_request, DefaultJob, QueuedJob, SameMessageJob};
use crate::domain::linked_list::LinkedList;
use crate::domain::runner::verify_signature_sets_now;
use crate::ports::inbound::{BlsVerificationApi, VerificationFuture};
use crate::ports::outbound::{Verifier, WorkerRunner};
use bls_telemetry::PoolMetrics;
use parking_lot::Mutex;
use std::future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

type Job<V> = QueuedJob<<V as Verifier>::PublicKey, <V as Verifier>::Signature>;

// =============================================================================
// Queue State
// =============================================================================

/// Batchable jobs collected until the flush timer fires or enough sets arrive.
struct JobBuffer<P, S> {
    id: u64,
    jobs: LinkedList<QueuedJob<P, S>>,
    prioritized_jobs: LinkedList<QueuedJob<P, S>>,
    sig_count: usize,
    first_push: Instant,
    flush_timer: AbortHandle,
}

impl<P, S> JobBuffer<P, S> {
    fn new(id: u64, flush_timer: AbortHandle) -> Self {
        Self {
            id,
            jobs: LinkedList::new(),
            prioritized_jobs: LinkedList::new(),
            sig_count: 0,
            first_push: Instant::now(),
            flush_timer,
        }
    }

    fn push(&mut self, job: QueuedJob<P, S>) {
        self.sig_count += job.signature_set_count();
        if job.opts().priority {
            self.prioritized_jobs.push(job);
        } else {
            self.jobs.push(job);
        }
    }

    fn job_count(&self) -> usize {
        self.jobs.len() + self.prioritized_jobs.len()
    }

    /// Cancel the timer and hand back every job, prioritized ones first.
    fn into_jobs(self) -> impl Iterator<Item = QueuedJob<P, S>> {
        self.flush_timer.abort();
        self.prioritized_jobs.into_iter().chain(self.jobs)
    }
}

struct QueueState<P, S> {
    jobs_for_next_run: LinkedList<QueuedJob<P, S>>,
    buffer: Option<JobBuffer<P, S>>,
    next_buffer_id: u64,
    closed: bool,
}

impl<P, S> QueueState<P, S> {
    fn new() -> Self {
        Self {
            jobs_for_next_run: LinkedList::new(),
            buffer: None,
            next_buffer_id: 0,
            closed: false,
        }
    }

    fn enqueue_ready(&mut self, job: QueuedJob<P, S>) {
        if job.opts().priority {
            self.jobs_for_next_run.unshift(job);
        } else {
            self.jobs_for_next_run.push(job);
        }
    }

    /// Move a buffer into the ready queue.
    ///
    /// Prioritized jobs land at the head in their original order, the rest at
    /// the tail.
    fn promote(&mut self, buffer: JobBuffer<P, S>) {
        buffer.flush_timer.abort();
        let JobBuffer {
            mut prioritized_jobs,
            jobs,
            ..
        } = buffer;
        while let Some(job) = prioritized_jobs.pop() {
            self.jobs_for_next_run.unshift(job);
        }
        for job in jobs {
            self.jobs_for_next_run.push(job);
        }
    }

    /// Drain jobs from the head until `max_sets` sets are taken.
    fn take_round(&mut self, max_sets: usize) -> Vec<QueuedJob<P, S>> {
        let mut jobs = Vec::new();
        let mut sig_count = 0;
        while sig_count < max_sets {
            let Some(job) = self.jobs_for_next_run.shift() else {
                break;
            };
            sig_count += job.signature_set_count();
            jobs.push(job);
        }
        jobs
    }
}

// =============================================================================
// Service
// =============================================================================

struct Inner<V: Verifier> {
    verifier: Arc<V>,
    runner: Arc<dyn WorkerRunner<V>>,
    config: PoolConfig,
    pool_size: usize,
    state: Mutex<QueueState<V::PublicKey, V::Signature>>,
    workers: Arc<Semaphore>,
    runtime: Handle,
    metrics: PoolMetrics,
}

/// Multi-threaded BLS verification pool.
///
/// Cloning is cheap; clones share the same queue and workers.
pub struct BlsMultiThreading<V: Verifier> {
    inner: Arc<Inner<V>>,
}

impl<V: Verifier> Clone for BlsMultiThreading<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Verifier> BlsMultiThreading<V> {
    /// Create a pool backed by a rayon thread pool of `config.pool_size`
    /// threads.
    ///
    /// Must be called from within a tokio runtime; dispatch ticks and flush
    /// timers are spawned on it.
    ///
    /// # Errors
    /// * `Setup` - no runtime, or the threads or metrics could not be created
    pub fn new(verifier: V, config: PoolConfig) -> Result<Self, VerificationError> {
        let verifier = Arc::new(verifier);
        let runner = Arc::new(RayonWorkerPool::new(Arc::clone(&verifier), &config)?);
        Self::with_runner(verifier, runner, config)
    }

    /// Create a pool that dispatches to `runner`.
    pub fn with_runner(
        verifier: Arc<V>,
        runner: Arc<dyn WorkerRunner<V>>,
        config: PoolConfig,
    ) -> Result<Self, VerificationError> {
        let metrics = PoolMetrics::new().map_err(|e| VerificationError::Setup(e.to_string()))?;
        Self::with_metrics(verifier, runner, config, metrics)
    }

    /// Create a pool that records into caller-owned metrics, e.g. the ones
    /// returned by `bls_telemetry::init_telemetry`.
    pub fn with_metrics(
        verifier: Arc<V>,
        runner: Arc<dyn WorkerRunner<V>>,
        config: PoolConfig,
        metrics: PoolMetrics,
    ) -> Result<Self, VerificationError> {
        let runtime = Handle::try_current().map_err(|e| VerificationError::Setup(e.to_string()))?;
        let pool_size = runner.pool_size().max(1);

        info!(
            pool_size,
            verify_all_in_queue = config.verify_all_in_queue,
            add_verification_randomness = config.add_verification_randomness,
            "[bls-pool] verification pool started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                verifier,
                runner,
                config,
                pool_size,
                state: Mutex::new(QueueState::new()),
                workers: Arc::new(Semaphore::new(pool_size)),
                runtime,
                metrics,
            }),
        })
    }

    /// Prometheus metrics recorded by this pool.
    pub fn metrics(&self) -> &PoolMetrics {
        &self.inner.metrics
    }

    /// Configuration the pool was created with.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Maximum number of rounds in flight at once.
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Dispatch rounds currently in flight.
    pub fn workers_busy(&self) -> usize {
        self.inner.workers_busy()
    }

    /// Jobs waiting in the ready queue (buffered jobs not included).
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().jobs_for_next_run.len()
    }
}

impl<V: Verifier> Inner<V> {
    fn workers_busy(&self) -> usize {
        self.pool_size
            .saturating_sub(self.workers.available_permits())
    }

    fn queue_job(self: &Arc<Self>, job: Job<V>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.closed {
            drop(guard);
            job.reject(VerificationError::QueueAborted);
            return;
        }

        let ready = if job.opts().batchable {
            let next_id = &mut state.next_buffer_id;
            let buffer = state.buffer.get_or_insert_with(|| {
                let id = *next_id;
                *next_id += 1;
                JobBuffer::new(id, self.arm_flush_timer(id))
            });
            buffer.push(job);

            if buffer.sig_count > self.config.max_buffered_sigs {
                match state.buffer.take() {
                    Some(buffer) => {
                        debug!(
                            jobs = buffer.job_count(),
                            sig_count = buffer.sig_count,
                            "[bls-pool] buffer full, flushing"
                        );
                        state.promote(buffer);
                        true
                    }
                    None => false,
                }
            } else {
                false
            }
        } else {
            state.enqueue_ready(job);
            true
        };

        self.metrics
            .queue_length
            .set(state.jobs_for_next_run.len() as i64);
        drop(guard);

        if ready {
            self.schedule_run();
        }
    }

    fn arm_flush_timer(self: &Arc<Self>, buffer_id: u64) -> AbortHandle {
        let weak = Arc::downgrade(self);
        let wait = Duration::from_millis(self.config.max_buffer_wait_ms);
        self.runtime
            .spawn(async move {
                tokio::time::sleep(wait).await;
                if let Some(inner) = weak.upgrade() {
                    inner.flush_buffer(buffer_id);
                }
            })
            .abort_handle()
    }

    /// Flush the buffer if it is still the one `buffer_id` was armed for.
    fn flush_buffer(self: &Arc<Self>, buffer_id: u64) {
        let mut state = self.state.lock();
        if state.buffer.as_ref().map(|buffer| buffer.id) != Some(buffer_id) {
            return;
        }
        let Some(buffer) = state.buffer.take() else {
            return;
        };

        debug!(
            jobs = buffer.job_count(),
            sig_count = buffer.sig_count,
            waited_ms = buffer.first_push.elapsed().as_millis() as u64,
            "[bls-pool] buffer wait elapsed, flushing"
        );
        state.promote(buffer);
        self.metrics
            .queue_length
            .set(state.jobs_for_next_run.len() as i64);
        drop(state);

        self.schedule_run();
    }

    fn schedule_run(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move { inner.run_job().await });
    }

    /// One dispatch tick.
    async fn run_job(self: Arc<Self>) {
        // The busy worker schedules another tick when it finishes
        let Ok(permit) = Arc::clone(&self.workers).try_acquire_owned() else {
            return;
        };

        let jobs = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let jobs = state.take_round(self.config.max_signature_sets_per_job);
            self.metrics
                .queue_length
                .set(state.jobs_for_next_run.len() as i64);
            jobs
        };
        if jobs.is_empty() {
            return;
        }

        self.metrics.workers_busy.set(self.workers_busy() as i64);
        self.execute_round(jobs).await;

        drop(permit);
        self.metrics.workers_busy.set(self.workers_busy() as i64);
        self.schedule_run();
    }

    async fn execute_round(&self, jobs: Vec<Job<V>>) {
        let now = Instant::now();
        let mut started = Vec::with_capacity(jobs.len());
        let mut requests = Vec::with_capacity(jobs.len());

        for job in jobs {
            self.metrics
                .job_wait_time
                .observe(now.saturating_duration_since(job.added_at()).as_secs_f64());

            let prepared = catch_unwind(AssertUnwindSafe(|| {
                prepare_work_request(
                    self.verifier.as_ref(),
                    &job,
                    self.config.add_verification_randomness,
                )
            }))
            .unwrap_or_else(|payload| Err(VerificationError::from_panic(payload.as_ref())));

            match prepared {
                Ok(request) => {
                    requests.push(request);
                    started.push(job);
                }
                Err(e) => self.settle_unprepared(job, e),
            }
        }

        if started.is_empty() {
            return;
        }
        self.metrics.jobs_started.inc_by(started.len() as u64);

        let outcome = {
            let _timer = bls_telemetry::time_histogram!(self.metrics.round_duration);
            self.runner.run_work_requests(requests).await
        };

        let batch = match outcome {
            Ok(batch) => batch,
            Err(e) => {
                let err = match e {
                    VerificationError::Worker(_) => e,
                    other => VerificationError::Worker(other.to_string()),
                };
                error!(jobs = started.len(), error = %err, "[bls-pool] worker round failed");
                self.metrics.job_errors.inc_by(started.len() as u64);
                for job in started {
                    job.reject(err.clone());
                }
                return;
            }
        };

        self.metrics.batch_retries.inc_by(batch.batch_retries as u64);
        self.metrics
            .batch_sigs_success
            .inc_by(batch.batch_sigs_success as u64);

        let mut results = batch.results.into_iter();
        for (index, job) in started.into_iter().enumerate() {
            let result = results
                .next()
                .unwrap_or(Err(VerificationError::MissingResult { index }));

            match job {
                QueuedJob::Default(job) => {
                    if result.is_err() {
                        self.metrics.job_errors.inc();
                    }
                    job.settle(result);
                }
                QueuedJob::SameMessage(job) => match result {
                    Ok(true) => job.resolve_all_valid(),
                    Ok(false) => self.retry_same_message(job),
                    Err(e) => {
                        debug!(error = %e, "[bls-pool] same-message aggregate errored, splitting");
                        self.retry_same_message(job);
                    }
                },
            }
        }
    }

    /// Settle a job whose work request could not be built.
    fn settle_unprepared(&self, job: Job<V>, error: VerificationError) {
        match job {
            QueuedJob::Default(job) => {
                warn!(error = %error, sets = job.sets.len(), "[bls-pool] job could not be prepared");
                self.metrics.job_errors.inc();
                job.settle(Err(error));
            }
            QueuedJob::SameMessage(job) => {
                debug!(
                    error = %error,
                    pairs = job.sets.len(),
                    "[bls-pool] same-message aggregation failed, splitting"
                );
                self.retry_same_message(job);
            }
        }
    }

    /// Re-queue a same-message job as one single-pair job per pair.
    ///
    /// Only called from inside a round; the tick scheduled when the round
    /// ends picks the children up.
    fn retry_same_message(&self, job: SameMessageJob<V::PublicKey, V::Signature>) {
        self.metrics.same_message_retries.inc();
        let priority = job.opts.priority;
        let (children, join) = job.into_single_jobs();
        self.runtime.spawn(join.settle());

        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            for child in children {
                child.reject(VerificationError::QueueAborted);
            }
            return;
        }

        if priority {
            for child in children.into_iter().rev() {
                state.jobs_for_next_run.unshift(child);
            }
        } else {
            for child in children {
                state.jobs_for_next_run.push(child);
            }
        }
        self.metrics
            .queue_length
            .set(state.jobs_for_next_run.len() as i64);
    }
}

// =============================================================================
// BlsVerificationApi Implementation
// =============================================================================

impl<V: Verifier> BlsVerificationApi for BlsMultiThreading<V> {
    type PublicKey = V::PublicKey;
    type Signature = V::Signature;

    fn verify_signature_sets(
        &self,
        sets: Vec<SignatureSet<V::PublicKey, V::Signature>>,
        opts: VerifyOptions,
    ) -> VerificationFuture<bool> {
        if sets.is_empty() {
            return Box::pin(future::ready(Err(VerificationError::EmptySignatureSets)));
        }

        let inner = &self.inner;
        if opts.verify_on_main_thread && !inner.config.verify_all_in_queue {
            inner.metrics.main_thread_verifications.inc();
            let result = verify_signature_sets_now(inner.verifier.as_ref(), &sets);
            return Box::pin(future::ready(result));
        }

        let receivers: Vec<_> =
            chunkify_maximize_chunk_size(sets, inner.config.max_signature_sets_per_job)
                .into_iter()
                .map(|chunk| {
                    let (job, rx) = DefaultJob::new(chunk, opts);
                    inner.queue_job(QueuedJob::Default(job));
                    rx
                })
                .collect();

        Box::pin(async move {
            let mut all_valid = true;
            for rx in receivers {
                let valid = rx.await.map_err(|_| VerificationError::QueueAborted)??;
                all_valid &= valid;
            }
            Ok::<_, VerificationError>(all_valid)
        })
    }

    fn verify_signature_sets_same_message(
        &self,
        sets: Vec<SameMessagePair<V::PublicKey, V::Signature>>,
        message: Vec<u8>,
        opts: VerifyOptions,
    ) -> VerificationFuture<Vec<bool>> {
        if sets.is_empty() {
            return Box::pin(future::ready(Err(VerificationError::EmptySignatureSets)));
        }

        let inner = &self.inner;
        let receivers: Vec<_> =
            chunkify_maximize_chunk_size(sets, inner.config.max_signature_sets_per_job)
                .into_iter()
                .map(|chunk| {
                    let (job, rx) = SameMessageJob::new(chunk, message.clone(), opts);
                    inner.queue_job(QueuedJob::SameMessage(job));
                    rx
                })
                .collect();

        Box::pin(async move {
            let mut results = Vec::new();
            for rx in receivers {
                let chunk = rx.await.map_err(|_| VerificationError::QueueAborted)??;
                results.extend(chunk);
            }
            Ok::<_, VerificationError>(results)
        })
    }

    fn close(&self) -> VerificationFuture<()> {
        let (buffer, ready) = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            (
                state.buffer.take(),
                std::mem::take(&mut state.jobs_for_next_run),
            )
        };

        let mut aborted = 0usize;
        for job in buffer.into_iter().flat_map(JobBuffer::into_jobs).chain(ready) {
            job.reject(VerificationError::QueueAborted);
            aborted += 1;
        }
        self.inner.metrics.queue_length.set(0);

        if aborted > 0 {
            info!(aborted, "[bls-pool] closed, pending jobs aborted");
        } else {
            debug!("[bls-pool] closed");
        }
        Box::pin(future::ready(Ok(())))
    }

    fn can_accept_work(&self) -> bool {
        self.workers_busy() < self.inner.pool_size
            && self.queue_len() < self.inner.config.max_jobs_can_accept_work
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::pool::InlineWorkerRunner;
    use crate::domain::entities::{WorkBatchResult, WorkRequest};
    use crate::test_helpers::{keypair, MockVerifier, INVALID_PUBLIC_KEY, INVALID_SIGNATURE};
    use async_trait::async_trait;

    type TestPool = BlsMultiThreading<MockVerifier>;

    fn pool_with(config: PoolConfig) -> (TestPool, Arc<MockVerifier>) {
        let verifier = Arc::new(MockVerifier::default());
        let runner = Arc::new(InlineWorkerRunner::new(Arc::clone(&verifier), &config));
        let pool = BlsMultiThreading::with_runner(Arc::clone(&verifier), runner, config).unwrap();
        (pool, verifier)
    }

    fn pool() -> (TestPool, Arc<MockVerifier>) {
        pool_with(PoolConfig::default())
    }

    fn valid_set(sk: u64, message: &[u8]) -> SignatureSet<u64, u64> {
        let (pk, sig) = keypair(sk, message);
        SignatureSet::single(pk, message, sig)
    }

    fn wrong_set(sk: u64, message: &[u8]) -> SignatureSet<u64, u64> {
        let (pk, _) = keypair(sk, message);
        let (_, sig) = keypair(sk, b"another message");
        SignatureSet::single(pk, message, sig)
    }

    fn pairs(count: u64, message: &[u8]) -> Vec<SameMessagePair<u64, u64>> {
        (1..=count)
            .map(|sk| {
                let (pk, sig) = keypair(sk, message);
                SameMessagePair::new(pk, sig)
            })
            .collect()
    }

    fn first_root(job: &QueuedJob<u64, u64>) -> Vec<u8> {
        match job {
            QueuedJob::Default(job) => job.sets[0].signing_root().to_vec(),
            QueuedJob::SameMessage(job) => job.message.clone(),
        }
    }

    /// Records the first signing root of every request it runs.
    struct RecordingRunner {
        inner: InlineWorkerRunner<MockVerifier>,
        seen: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl WorkerRunner<MockVerifier> for RecordingRunner {
        fn pool_size(&self) -> usize {
            1
        }

        async fn run_work_requests(
            &self,
            requests: Vec<WorkRequest<u64, u64>>,
        ) -> Result<WorkBatchResult, VerificationError> {
            self.seen
                .lock()
                .extend(requests.iter().map(|r| r.sets[0].message.clone()));
            self.inner.run_work_requests(requests).await
        }
    }

    /// Holds every round until the gate opens.
    struct GatedRunner {
        inner: InlineWorkerRunner<MockVerifier>,
        gate: Semaphore,
    }

    #[async_trait]
    impl WorkerRunner<MockVerifier> for GatedRunner {
        fn pool_size(&self) -> usize {
            1
        }

        async fn run_work_requests(
            &self,
            requests: Vec<WorkRequest<u64, u64>>,
        ) -> Result<WorkBatchResult, VerificationError> {
            let _pass = self.gate.acquire().await.unwrap();
            self.inner.run_work_requests(requests).await
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl WorkerRunner<MockVerifier> for FailingRunner {
        fn pool_size(&self) -> usize {
            2
        }

        async fn run_work_requests(
            &self,
            _requests: Vec<WorkRequest<u64, u64>>,
        ) -> Result<WorkBatchResult, VerificationError> {
            Err(VerificationError::Worker("worker terminated".to_string()))
        }
    }

    // =========================================================================
    // verify_signature_sets
    // =========================================================================

    #[tokio::test]
    async fn test_valid_sets_resolve_true() {
        let (pool, _) = pool();
        let sets = (1..=5).map(|sk| valid_set(sk, b"msg")).collect();
        assert_eq!(
            pool.verify_signature_sets(sets, VerifyOptions::default()).await,
            Ok(true)
        );
        assert_eq!(pool.metrics().jobs_started.get(), 1);
    }

    #[tokio::test]
    async fn test_one_wrong_set_resolves_false() {
        let (pool, _) = pool();
        let sets = vec![valid_set(1, b"a"), wrong_set(2, b"b"), valid_set(3, b"c")];
        assert_eq!(
            pool.verify_signature_sets(sets, VerifyOptions::default()).await,
            Ok(false)
        );
    }

    #[tokio::test]
    async fn test_empty_sets_rejected() {
        let (pool, verifier) = pool();
        assert_eq!(
            pool.verify_signature_sets(Vec::new(), VerifyOptions::default())
                .await,
            Err(VerificationError::EmptySignatureSets)
        );
        assert_eq!(verifier.verify_calls(), 0);
    }

    #[tokio::test]
    async fn test_large_submission_split_into_jobs() {
        let (pool, _) = pool();
        let sets: Vec<_> = (1..=300).map(|sk| valid_set(sk, b"big")).collect();
        assert_eq!(
            pool.verify_signature_sets(sets, VerifyOptions::default()).await,
            Ok(true)
        );
        // 300 sets at most 128 per job: two jobs of 150
        assert_eq!(pool.metrics().jobs_started.get(), 2);

        let mut sets: Vec<_> = (1..=300).map(|sk| valid_set(sk, b"big")).collect();
        sets[250] = wrong_set(251, b"big");
        assert_eq!(
            pool.verify_signature_sets(sets, VerifyOptions::default()).await,
            Ok(false)
        );
    }

    #[tokio::test]
    async fn test_main_thread_verification_skips_queue() {
        let (pool, verifier) = pool();
        let opts = VerifyOptions {
            verify_on_main_thread: true,
            ..VerifyOptions::default()
        };

        let sets = vec![valid_set(1, b"a"), valid_set(2, b"b")];
        assert_eq!(pool.verify_signature_sets(sets, opts).await, Ok(true));
        assert_eq!(verifier.batch_calls(), 1);
        assert_eq!(pool.metrics().main_thread_verifications.get(), 1);
        assert_eq!(pool.metrics().jobs_started.get(), 0);

        assert_eq!(
            pool.verify_signature_sets(vec![valid_set(3, b"c")], opts).await,
            Ok(true)
        );
        assert_eq!(verifier.verify_calls(), 1);
    }

    #[tokio::test]
    async fn test_verify_all_in_queue_overrides_main_thread() {
        let (pool, _) = pool_with(PoolConfig {
            verify_all_in_queue: true,
            ..PoolConfig::default()
        });
        let opts = VerifyOptions {
            verify_on_main_thread: true,
            ..VerifyOptions::default()
        };

        assert_eq!(
            pool.verify_signature_sets(vec![valid_set(1, b"a")], opts).await,
            Ok(true)
        );
        assert_eq!(pool.metrics().main_thread_verifications.get(), 0);
        assert_eq!(pool.metrics().jobs_started.get(), 1);
    }

    #[tokio::test]
    async fn test_invalid_public_key_rejects_job() {
        let (pool, _) = pool();
        let (pk, sig) = keypair(1, b"m");
        let sets = vec![SignatureSet::aggregate(vec![pk, INVALID_PUBLIC_KEY], b"m", sig)];

        let err = pool
            .verify_signature_sets(sets, VerifyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::InvalidPublicKey { index: 1, .. }));
        assert_eq!(pool.metrics().job_errors.get(), 1);
    }

    // =========================================================================
    // Buffering
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_batchable_jobs_share_one_round() {
        let (pool, verifier) = pool();
        let futures: Vec<_> = (1..=3)
            .map(|sk| pool.verify_signature_sets(vec![valid_set(sk, b"m")], VerifyOptions::batchable()))
            .collect();

        assert_eq!(pool.queue_len(), 0);
        for future in futures {
            assert_eq!(future.await, Ok(true));
        }
        assert_eq!(verifier.batch_calls(), 1);
        assert_eq!(pool.metrics().batch_sigs_success.get(), 3);
        assert_eq!(pool.metrics().jobs_started.get(), 3);
    }

    #[tokio::test]
    async fn test_buffer_overflow_flushes_without_timer() {
        let (pool, verifier) = pool_with(PoolConfig {
            max_buffer_wait_ms: 60_000,
            ..PoolConfig::default()
        });

        // 33 sets pass max_buffered_sigs (32)
        let futures: Vec<_> = (1..=33)
            .map(|sk| pool.verify_signature_sets(vec![valid_set(sk, b"m")], VerifyOptions::batchable()))
            .collect();

        let all = async {
            for future in futures {
                assert_eq!(future.await, Ok(true));
            }
        };
        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .unwrap();
        // 33 batchable sets chunked by 16: two batches
        assert_eq!(verifier.batch_calls(), 2);
    }

    #[tokio::test]
    async fn test_buffer_counts_same_message_as_one_set() {
        let (pool, _) = pool_with(PoolConfig {
            max_buffer_wait_ms: 60_000,
            ..PoolConfig::default()
        });

        let _same = pool.verify_signature_sets_same_message(
            pairs(10, b"m"),
            b"m".to_vec(),
            VerifyOptions::batchable(),
        );
        let _default = pool.verify_signature_sets(
            vec![valid_set(1, b"a"), valid_set(2, b"b"), valid_set(3, b"c")],
            VerifyOptions::batchable(),
        );

        let state = pool.inner.state.lock();
        let buffer = state.buffer.as_ref().unwrap();
        assert_eq!(buffer.sig_count, 4);
        assert_eq!(buffer.job_count(), 2);
    }

    #[tokio::test]
    async fn test_flush_keeps_prioritized_order() {
        let (pool, _) = pool_with(PoolConfig {
            max_buffer_wait_ms: 60_000,
            ..PoolConfig::default()
        });
        let priority = VerifyOptions::batchable().with_priority();

        let _a = pool.verify_signature_sets(vec![valid_set(1, b"a")], priority);
        let _b = pool.verify_signature_sets(vec![valid_set(2, b"b")], VerifyOptions::batchable());
        let _c = pool.verify_signature_sets(vec![valid_set(3, b"c")], priority);

        pool.inner.flush_buffer(0);

        let state = pool.inner.state.lock();
        assert!(state.buffer.is_none());
        let order: Vec<_> = state.jobs_for_next_run.iter().map(first_root).collect();
        assert_eq!(order, vec![b"a".to_vec(), b"c".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test]
    async fn test_stale_timer_does_not_flush_newer_buffer() {
        let (pool, _) = pool_with(PoolConfig {
            max_buffer_wait_ms: 60_000,
            ..PoolConfig::default()
        });

        let _job = pool.verify_signature_sets(vec![valid_set(1, b"a")], VerifyOptions::batchable());
        pool.inner.flush_buffer(42);
        assert!(pool.inner.state.lock().buffer.is_some());
        assert_eq!(pool.queue_len(), 0);

        pool.inner.flush_buffer(0);
        assert!(pool.inner.state.lock().buffer.is_none());
        assert_eq!(pool.queue_len(), 1);
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[tokio::test]
    async fn test_priority_jobs_run_first() {
        let verifier = Arc::new(MockVerifier::default());
        let config = PoolConfig::default();
        let runner = Arc::new(RecordingRunner {
            inner: InlineWorkerRunner::new(Arc::clone(&verifier), &config),
            seen: Mutex::new(Vec::new()),
        });
        let pool = BlsMultiThreading::with_runner(verifier, runner.clone(), config).unwrap();

        let a = pool.verify_signature_sets(vec![valid_set(1, b"a")], VerifyOptions::default());
        let b = pool.verify_signature_sets(vec![valid_set(2, b"b")], VerifyOptions::default());
        let c = pool.verify_signature_sets(
            vec![valid_set(3, b"c")],
            VerifyOptions::default().with_priority(),
        );

        assert_eq!(c.await, Ok(true));
        assert_eq!(a.await, Ok(true));
        assert_eq!(b.await, Ok(true));
        assert_eq!(
            *runner.seen.lock(),
            vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()]
        );
    }

    // =========================================================================
    // Same message
    // =========================================================================

    #[tokio::test]
    async fn test_same_message_all_valid() {
        let (pool, verifier) = pool();
        let result = pool
            .verify_signature_sets_same_message(pairs(6, b"m"), b"m".to_vec(), VerifyOptions::default())
            .await;

        assert_eq!(result, Ok(vec![true; 6]));
        assert_eq!(verifier.verify_calls(), 1);
        assert_eq!(pool.metrics().same_message_retries.get(), 0);
    }

    #[tokio::test]
    async fn test_same_message_bad_pair_decomposed() {
        let (pool, _) = pool();
        let mut sets = pairs(6, b"m");
        sets[2].signature = keypair(3, b"other").1;

        let result = pool
            .verify_signature_sets_same_message(sets, b"m".to_vec(), VerifyOptions::default())
            .await;

        assert_eq!(result, Ok(vec![true, true, false, true, true, true]));
        assert_eq!(pool.metrics().same_message_retries.get(), 1);
    }

    #[tokio::test]
    async fn test_same_message_invalid_signature_decomposed() {
        let (pool, _) = pool();
        let mut sets = pairs(3, b"m");
        sets[1].signature = INVALID_SIGNATURE;

        let result = pool
            .verify_signature_sets_same_message(sets, b"m".to_vec(), VerifyOptions::default())
            .await;

        assert_eq!(result, Ok(vec![true, false, true]));
    }

    #[tokio::test]
    async fn test_same_message_empty_rejected() {
        let (pool, _) = pool();
        assert_eq!(
            pool.verify_signature_sets_same_message(Vec::new(), b"m".to_vec(), VerifyOptions::default())
                .await,
            Err(VerificationError::EmptySignatureSets)
        );
    }

    #[tokio::test]
    async fn test_same_message_chunks_concatenated() {
        let (pool, _) = pool();
        let mut sets = pairs(300, b"m");
        sets[299].signature = keypair(300, b"other").1;

        let result = pool
            .verify_signature_sets_same_message(sets, b"m".to_vec(), VerifyOptions::default())
            .await
            .unwrap();

        assert_eq!(result.len(), 300);
        assert!(result[..299].iter().all(|valid| *valid));
        assert!(!result[299]);
    }

    // =========================================================================
    // Close and back-pressure
    // =========================================================================

    #[tokio::test]
    async fn test_close_rejects_queued_jobs() {
        let (pool, verifier) = pool();
        let futures: Vec<_> = (1..=3)
            .map(|sk| pool.verify_signature_sets(vec![valid_set(sk, b"m")], VerifyOptions::default()))
            .collect();
        assert_eq!(pool.queue_len(), 3);

        pool.close().await.unwrap();
        for future in futures {
            assert_eq!(future.await, Err(VerificationError::QueueAborted));
        }
        assert_eq!(verifier.verify_calls(), 0);
        assert_eq!(pool.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_buffered_jobs() {
        let (pool, _) = pool();
        let buffered = pool.verify_signature_sets(vec![valid_set(1, b"m")], VerifyOptions::batchable());
        let same = pool.verify_signature_sets_same_message(
            pairs(2, b"m"),
            b"m".to_vec(),
            VerifyOptions::batchable(),
        );

        pool.close().await.unwrap();
        assert_eq!(buffered.await, Err(VerificationError::QueueAborted));
        assert_eq!(same.await, Err(VerificationError::QueueAborted));
        assert!(pool.inner.state.lock().buffer.is_none());
    }

    #[tokio::test]
    async fn test_submission_after_close_rejected() {
        let (pool, _) = pool();
        pool.close().await.unwrap();
        // Idempotent
        pool.close().await.unwrap();

        assert_eq!(
            pool.verify_signature_sets(vec![valid_set(1, b"m")], VerifyOptions::default())
                .await,
            Err(VerificationError::QueueAborted)
        );
        assert_eq!(
            pool.verify_signature_sets_same_message(pairs(2, b"m"), b"m".to_vec(), VerifyOptions::default())
                .await,
            Err(VerificationError::QueueAborted)
        );
    }

    #[tokio::test]
    async fn test_can_accept_work_tracks_queue_length() {
        let (pool, _) = pool_with(PoolConfig {
            max_jobs_can_accept_work: 2,
            ..PoolConfig::default()
        });
        assert!(pool.can_accept_work());

        let a = pool.verify_signature_sets(vec![valid_set(1, b"a")], VerifyOptions::default());
        let b = pool.verify_signature_sets(vec![valid_set(2, b"b")], VerifyOptions::default());
        assert!(!pool.can_accept_work());

        assert_eq!(a.await, Ok(true));
        assert_eq!(b.await, Ok(true));
        tokio::task::yield_now().await;
        assert!(pool.can_accept_work());
    }

    #[tokio::test]
    async fn test_can_accept_work_tracks_busy_workers() {
        let verifier = Arc::new(MockVerifier::default());
        let config = PoolConfig::default();
        let runner = Arc::new(GatedRunner {
            inner: InlineWorkerRunner::new(Arc::clone(&verifier), &config),
            gate: Semaphore::new(0),
        });
        let pool = BlsMultiThreading::with_runner(verifier, runner.clone(), config).unwrap();

        let job = pool.verify_signature_sets(vec![valid_set(1, b"a")], VerifyOptions::default());
        while pool.workers_busy() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!pool.can_accept_work());
        assert_eq!(pool.metrics().workers_busy.get(), 1);

        runner.gate.add_permits(1);
        assert_eq!(job.await, Ok(true));
        while pool.workers_busy() > 0 {
            tokio::task::yield_now().await;
        }
        assert!(pool.can_accept_work());
    }

    #[tokio::test]
    async fn test_runner_failure_rejects_round() {
        let verifier = Arc::new(MockVerifier::default());
        let pool =
            BlsMultiThreading::with_runner(verifier, Arc::new(FailingRunner), PoolConfig::default())
                .unwrap();

        let a = pool.verify_signature_sets(vec![valid_set(1, b"a")], VerifyOptions::default());
        let b = pool.verify_signature_sets(vec![valid_set(2, b"b")], VerifyOptions::default());

        let expected = Err(VerificationError::Worker("worker terminated".to_string()));
        assert_eq!(a.await, expected);
        assert_eq!(b.await, expected);
        assert_eq!(pool.metrics().job_errors.get(), 2);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = BlsMultiThreading::new(MockVerifier::default(), PoolConfig::default());
        assert!(matches!(result, Err(VerificationError::Setup(_))));
    }
}
