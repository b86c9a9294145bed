//! # Inbound Ports (Driving Ports / API)
//!
//! The public API of the verification pool.

use crate::domain::entities::{SameMessagePair, SignatureSet, VerifyOptions};
use crate::domain::errors::VerificationError;
use std::future::Future;
use std::pin::Pin;

/// Future returned by the pool. Work is already queued when it is returned;
/// awaiting only waits for the outcome.
pub type VerificationFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, VerificationError>> + Send + 'static>>;

/// Primary verification API.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait BlsVerificationApi: Send + Sync {
    type PublicKey;
    type Signature;

    /// Verify independent signature sets.
    ///
    /// Resolves to `true` only if every set is valid. A malformed key or
    /// signature resolves to an error, a wrong signature to `false`.
    ///
    /// # Errors
    /// * `EmptySignatureSets` - `sets` is empty
    /// * `QueueAborted` - the pool was closed before the work ran
    fn verify_signature_sets(
        &self,
        sets: Vec<SignatureSet<Self::PublicKey, Self::Signature>>,
        opts: VerifyOptions,
    ) -> VerificationFuture<bool>;

    /// Verify many key/signature pairs over one message.
    ///
    /// Resolves to one boolean per pair, in input order.
    /// `verify_on_main_thread` is ignored.
    fn verify_signature_sets_same_message(
        &self,
        sets: Vec<SameMessagePair<Self::PublicKey, Self::Signature>>,
        message: Vec<u8>,
        opts: VerifyOptions,
    ) -> VerificationFuture<Vec<bool>>;

    /// Reject all waiting work and refuse new work. Idempotent.
    fn close(&self) -> VerificationFuture<()>;

    /// Advisory back-pressure signal.
    fn can_accept_work(&self) -> bool;
}
