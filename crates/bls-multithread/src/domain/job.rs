//! # Queued Jobs
//!
//! The unit of scheduled work and its conversion into a `WorkRequest`.
//!
//! A job owns the sending half of a one-shot channel; the caller holds the
//! receiving half. Settling consumes the job, so every job settles at most
//! once by construction.

use super::entities::{
    RandomScalar, SameMessagePair, SignatureSet, VerifyOptions, VerifySet, WorkRequest,
    WorkResult,
};
use super::errors::VerificationError;
use crate::ports::outbound::Verifier;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to a same-message caller.
pub type SameMessageResult = Result<Vec<bool>, VerificationError>;

// =============================================================================
// Job Types
// =============================================================================

/// Independent signature sets verified together; one boolean for all.
#[derive(Debug)]
pub struct DefaultJob<P, S> {
    pub opts: VerifyOptions,
    pub sets: Vec<SignatureSet<P, S>>,
    pub added_at: Instant,
    reply: oneshot::Sender<WorkResult>,
}

/// Many key/signature pairs over one message; one boolean per pair.
#[derive(Debug)]
pub struct SameMessageJob<P, S> {
    pub opts: VerifyOptions,
    pub message: Vec<u8>,
    pub sets: Vec<SameMessagePair<P, S>>,
    pub added_at: Instant,
    reply: oneshot::Sender<SameMessageResult>,
}

/// A job waiting in the buffer or the ready queue.
#[derive(Debug)]
pub enum QueuedJob<P, S> {
    Default(DefaultJob<P, S>),
    SameMessage(SameMessageJob<P, S>),
}

impl<P, S> DefaultJob<P, S> {
    /// Create a job and the receiver its caller awaits.
    pub fn new(
        sets: Vec<SignatureSet<P, S>>,
        opts: VerifyOptions,
    ) -> (Self, oneshot::Receiver<WorkResult>) {
        let (reply, rx) = oneshot::channel();
        let job = Self {
            opts,
            sets,
            added_at: Instant::now(),
            reply,
        };
        (job, rx)
    }

    /// Deliver the outcome. A caller that stopped waiting is not an error.
    pub fn settle(self, result: WorkResult) {
        if self.reply.send(result).is_err() {
            debug!("[bls-pool] default job receiver dropped before settlement");
        }
    }
}

impl<P, S> SameMessageJob<P, S> {
    /// Create a job and the receiver its caller awaits.
    pub fn new(
        sets: Vec<SameMessagePair<P, S>>,
        message: Vec<u8>,
        opts: VerifyOptions,
    ) -> (Self, oneshot::Receiver<SameMessageResult>) {
        let (reply, rx) = oneshot::channel();
        let job = Self {
            opts,
            message,
            sets,
            added_at: Instant::now(),
            reply,
        };
        (job, rx)
    }

    pub fn settle(self, result: SameMessageResult) {
        if self.reply.send(result).is_err() {
            debug!("[bls-pool] same-message job receiver dropped before settlement");
        }
    }

    /// Every pair verified as part of a valid aggregate.
    pub fn resolve_all_valid(self) {
        let all = vec![true; self.sets.len()];
        self.settle(Ok(all));
    }

    /// Split into one size-1, non-batchable default job per pair.
    ///
    /// Children keep the parent's priority and enqueue time. The returned
    /// [`SameMessageJoin`] must be driven to settle the parent.
    pub fn into_single_jobs(self) -> (Vec<QueuedJob<P, S>>, SameMessageJoin) {
        let opts = VerifyOptions {
            batchable: false,
            priority: self.opts.priority,
            ..VerifyOptions::default()
        };

        let mut children = Vec::with_capacity(self.sets.len());
        let mut receivers = Vec::with_capacity(self.sets.len());
        for pair in self.sets {
            let (reply, rx) = oneshot::channel();
            children.push(QueuedJob::Default(DefaultJob {
                opts,
                sets: vec![SignatureSet::Single {
                    public_key: pair.public_key,
                    signing_root: self.message.clone(),
                    signature: pair.signature,
                }],
                added_at: self.added_at,
                reply,
            }));
            receivers.push(rx);
        }

        let join = SameMessageJoin {
            receivers,
            reply: self.reply,
        };
        (children, join)
    }
}

/// Collects the outcomes of a split same-message job into its parent reply.
#[derive(Debug)]
pub struct SameMessageJoin {
    receivers: Vec<oneshot::Receiver<WorkResult>>,
    reply: oneshot::Sender<SameMessageResult>,
}

impl SameMessageJoin {
    /// Wait for every child, then settle the parent.
    ///
    /// The parent resolves with one boolean per child in order, or rejects
    /// with the first failing child's error (by position).
    pub async fn settle(self) {
        let mut outcomes = Vec::with_capacity(self.receivers.len());
        for rx in self.receivers {
            let outcome = rx
                .await
                .unwrap_or_else(|_| Err(VerificationError::Worker("job dropped".to_string())));
            outcomes.push(outcome);
        }

        let result = outcomes.into_iter().collect::<Result<Vec<bool>, _>>();
        if self.reply.send(result).is_err() {
            debug!("[bls-pool] same-message receiver dropped before join settled");
        }
    }
}

impl<P, S> QueuedJob<P, S> {
    pub fn opts(&self) -> &VerifyOptions {
        match self {
            Self::Default(job) => &job.opts,
            Self::SameMessage(job) => &job.opts,
        }
    }

    pub fn added_at(&self) -> Instant {
        match self {
            Self::Default(job) => job.added_at,
            Self::SameMessage(job) => job.added_at,
        }
    }

    /// Sets this job contributes to a round.
    ///
    /// A same-message job counts as one: it is verified as one aggregate.
    pub fn signature_set_count(&self) -> usize {
        match self {
            Self::Default(job) => job.sets.len(),
            Self::SameMessage(_) => 1,
        }
    }

    /// Settle the job with an error regardless of its kind.
    pub fn reject(self, error: VerificationError) {
        match self {
            Self::Default(job) => job.settle(Err(error)),
            Self::SameMessage(job) => job.settle(Err(error)),
        }
    }
}

// =============================================================================
// Work Request Builder
// =============================================================================

/// Convert a job into the request a worker executes.
///
/// # Arguments
/// * `verifier` - Supplies aggregation, validation and blinding
/// * `job` - The job to convert; left untouched so a failure can still settle it
/// * `pool_randomness` - Pool-wide default for `add_verification_randomness`
///
/// # Errors
/// * `InvalidPublicKey` / `InvalidSignature` naming the offending index
pub fn prepare_work_request<V: Verifier>(
    verifier: &V,
    job: &QueuedJob<V::PublicKey, V::Signature>,
    pool_randomness: bool,
) -> Result<WorkRequest<V::PublicKey, V::Signature>, VerificationError> {
    match job {
        QueuedJob::Default(job) => {
            let sets = job
                .sets
                .iter()
                .map(|set| effective_verify_set(verifier, set))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(WorkRequest {
                opts: job.opts,
                sets,
            })
        }
        QueuedJob::SameMessage(job) => {
            let randomize = job.opts.add_verification_randomness || pool_randomness;
            let set = aggregate_same_message(verifier, job, randomize)?;
            Ok(WorkRequest {
                opts: job.opts,
                sets: vec![set],
            })
        }
    }
}

/// Resolve the key a set is checked against: the key itself, or the
/// aggregate of all its signers.
pub(crate) fn effective_verify_set<V: Verifier>(
    verifier: &V,
    set: &SignatureSet<V::PublicKey, V::Signature>,
) -> Result<VerifySet<V::PublicKey, V::Signature>, VerificationError> {
    let public_key = match set {
        SignatureSet::Single { public_key, .. } => public_key.clone(),
        SignatureSet::Aggregate { public_keys, .. } => {
            let refs: Vec<&V::PublicKey> = public_keys.iter().collect();
            verifier.aggregate_public_keys(&refs)?
        }
    };
    Ok(VerifySet {
        message: set.signing_root().to_vec(),
        public_key,
        signature: set.signature().clone(),
    })
}

fn aggregate_same_message<V: Verifier>(
    verifier: &V,
    job: &SameMessageJob<V::PublicKey, V::Signature>,
    randomize: bool,
) -> Result<VerifySet<V::PublicKey, V::Signature>, VerificationError> {
    // Group-check before anything touches the points
    for (index, pair) in job.sets.iter().enumerate() {
        verifier
            .validate_signature(&pair.signature)
            .map_err(|e| e.at_index(index))?;
    }

    let (public_key, signature) = if randomize {
        let mut public_keys = Vec::with_capacity(job.sets.len());
        let mut signatures = Vec::with_capacity(job.sets.len());
        for (index, pair) in job.sets.iter().enumerate() {
            // Same scalar on both halves keeps the pairing equation intact
            let scalar = RandomScalar::random();
            public_keys.push(
                verifier
                    .multiply_public_key(&pair.public_key, &scalar)
                    .map_err(|e| e.at_index(index))?,
            );
            signatures.push(
                verifier
                    .multiply_signature(&pair.signature, &scalar)
                    .map_err(|e| e.at_index(index))?,
            );
        }
        let pk_refs: Vec<&V::PublicKey> = public_keys.iter().collect();
        let sig_refs: Vec<&V::Signature> = signatures.iter().collect();
        (
            verifier.aggregate_public_keys(&pk_refs)?,
            verifier.aggregate_signatures(&sig_refs)?,
        )
    } else {
        let pk_refs: Vec<&V::PublicKey> = job.sets.iter().map(|p| &p.public_key).collect();
        let sig_refs: Vec<&V::Signature> = job.sets.iter().map(|p| &p.signature).collect();
        (
            verifier.aggregate_public_keys(&pk_refs)?,
            verifier.aggregate_signatures(&sig_refs)?,
        )
    };

    Ok(VerifySet {
        message: job.message.clone(),
        public_key,
        signature,
    })
}
