//! # Outbound Ports (Driven Ports / SPI)
//!
//! Traits that define what the verification pool depends on: the BLS
//! primitives and the workers that run them.

use crate::domain::entities::{RandomScalar, VerifySet, WorkBatchResult, WorkRequest};
use crate::domain::errors::VerificationError;
use async_trait::async_trait;

/// Synchronous BLS12-381 primitives.
///
/// Implementations hold no per-call state and may be called from any worker
/// thread at once.
pub trait Verifier: Send + Sync + 'static {
    /// Public key type (G1 point for min-pk BLS)
    type PublicKey: Clone + Send + Sync + 'static;
    /// Signature type (G2 point for min-pk BLS)
    type Signature: Clone + Send + Sync + 'static;

    /// Verify one signature over one message.
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature.
    fn verify(
        &self,
        message: &[u8],
        public_key: &Self::PublicKey,
        signature: &Self::Signature,
    ) -> Result<bool, VerificationError>;

    /// Aggregate public keys into one.
    ///
    /// # Errors
    /// * `InvalidPublicKey` naming the index of the offending key
    fn aggregate_public_keys(
        &self,
        public_keys: &[&Self::PublicKey],
    ) -> Result<Self::PublicKey, VerificationError>;

    /// Aggregate signatures into one.
    ///
    /// # Errors
    /// * `InvalidSignature` naming the index of the offending signature
    fn aggregate_signatures(
        &self,
        signatures: &[&Self::Signature],
    ) -> Result<Self::Signature, VerificationError>;

    /// Verify many sets at once with random blinding.
    ///
    /// `Ok(true)` only if every set is valid.
    fn verify_multiple_aggregate_signatures(
        &self,
        sets: &[VerifySet<Self::PublicKey, Self::Signature>],
    ) -> Result<bool, VerificationError>;

    /// Subgroup check of a signature.
    fn validate_signature(&self, signature: &Self::Signature) -> Result<(), VerificationError>;

    /// Multiply a public key by a blinding scalar.
    fn multiply_public_key(
        &self,
        public_key: &Self::PublicKey,
        scalar: &RandomScalar,
    ) -> Result<Self::PublicKey, VerificationError>;

    /// Multiply a signature by a blinding scalar.
    fn multiply_signature(
        &self,
        signature: &Self::Signature,
        scalar: &RandomScalar,
    ) -> Result<Self::Signature, VerificationError>;
}

/// Executes groups of work requests off the caller's task.
///
/// Results are positionally aligned with the input. An `Err` means the whole
/// call was lost (worker gone) and no per-request result is available.
#[async_trait]
pub trait WorkerRunner<V: Verifier>: Send + Sync {
    /// Number of workers backing this runner.
    fn pool_size(&self) -> usize;

    /// Run a group of requests with batch-then-retry semantics.
    async fn run_work_requests(
        &self,
        requests: Vec<WorkRequest<V::PublicKey, V::Signature>>,
    ) -> Result<WorkBatchResult, VerificationError>;
}
