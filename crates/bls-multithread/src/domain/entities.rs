//! # Domain Entities
//!
//! Core data structures for scheduling signature set verification.
//!
//! Key and signature types are generic: the scheduler never looks inside
//! them, only the `Verifier` port does.

use super::errors::VerificationError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

// =============================================================================
// Input Types
// =============================================================================

/// A unit of work submitted by a caller.
///
/// Verified as one "message, key, signature" triple once the effective public
/// key is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureSet<P, S> {
    /// One signer over one message
    Single {
        public_key: P,
        signing_root: Vec<u8>,
        signature: S,
    },
    /// Many signers over one message with a pre-aggregated signature
    Aggregate {
        public_keys: Vec<P>,
        signing_root: Vec<u8>,
        signature: S,
    },
}

impl<P, S> SignatureSet<P, S> {
    /// Build a single-signer set.
    pub fn single(public_key: P, signing_root: impl Into<Vec<u8>>, signature: S) -> Self {
        Self::Single {
            public_key,
            signing_root: signing_root.into(),
            signature,
        }
    }

    /// Build a multi-signer set.
    pub fn aggregate(public_keys: Vec<P>, signing_root: impl Into<Vec<u8>>, signature: S) -> Self {
        Self::Aggregate {
            public_keys,
            signing_root: signing_root.into(),
            signature,
        }
    }

    /// The signed message.
    pub fn signing_root(&self) -> &[u8] {
        match self {
            Self::Single { signing_root, .. } | Self::Aggregate { signing_root, .. } => {
                signing_root
            }
        }
    }

    pub fn signature(&self) -> &S {
        match self {
            Self::Single { signature, .. } | Self::Aggregate { signature, .. } => signature,
        }
    }
}

/// One key/signature pair of a same-message submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SameMessagePair<P, S> {
    pub public_key: P,
    pub signature: S,
}

impl<P, S> SameMessagePair<P, S> {
    pub fn new(public_key: P, signature: S) -> Self {
        Self {
            public_key,
            signature,
        }
    }
}

/// Per-call verification options. Everything defaults to `false`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyOptions {
    /// May be combined with other batchable jobs and verified as one batch
    pub batchable: bool,
    /// Verify synchronously in the caller's context, bypassing the queue
    pub verify_on_main_thread: bool,
    /// Jump ahead of non-priority jobs in the queue
    pub priority: bool,
    /// Blind same-message pairs with random scalars before aggregation
    pub add_verification_randomness: bool,
}

impl VerifyOptions {
    pub fn batchable() -> Self {
        Self {
            batchable: true,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self) -> Self {
        self.priority = true;
        self
    }
}

// =============================================================================
// Worker Types
// =============================================================================

/// A fully prepared triple ready for the verifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifySet<P, S> {
    pub message: Vec<u8>,
    pub public_key: P,
    pub signature: S,
}

/// What a worker executes for one queued job.
#[derive(Clone, Debug)]
pub struct WorkRequest<P, S> {
    pub opts: VerifyOptions,
    pub sets: Vec<VerifySet<P, S>>,
}

/// Outcome of one work request.
pub type WorkResult = Result<bool, VerificationError>;

/// Outcome of a group of work requests, aligned with the request order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkBatchResult {
    pub results: Vec<WorkResult>,
    /// Batches that failed and were retried set by set
    pub batch_retries: usize,
    /// Sets confirmed valid by a successful batch
    pub batch_sigs_success: usize,
}

// =============================================================================
// Randomness
// =============================================================================

/// Non-zero 64-bit blinding scalar, little-endian, wiped on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct RandomScalar([u8; 8]);

impl RandomScalar {
    /// Draw a fresh scalar from the OS CSPRNG, retrying on zero.
    pub fn random() -> Self {
        Self::from_rng(&mut rand::rngs::OsRng)
    }

    pub fn from_rng<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        loop {
            let value = rng.next_u64();
            if value != 0 {
                return Self(value.to_le_bytes());
            }
        }
    }

    /// Little-endian bytes of the scalar.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn value(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }
}

impl std::fmt::Debug for RandomScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RandomScalar(..)")
    }
}
