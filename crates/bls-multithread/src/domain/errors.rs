//! # Verification Errors
//!
//! Error types for the verification pool, its work requests and the
//! verifier port.

use thiserror::Error;

/// Errors that can occur while scheduling or verifying signature sets.
///
/// The type is `Clone` because one error may settle several waiters, e.g.
/// every job rejected by `close()` or every job of a lost worker round.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// `verify_signature_sets` was called with nothing to verify
    #[error("Empty signature set array")]
    EmptySignatureSets,

    /// A public key could not be aggregated or failed validation
    #[error("Invalid public key at index {index}: {reason}")]
    InvalidPublicKey { index: usize, reason: String },

    /// A signature could not be aggregated or failed its group check
    #[error("Invalid signature at index {index}: {reason}")]
    InvalidSignature { index: usize, reason: String },

    /// Aggregation failed for a reason not tied to a single input
    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    /// The verifier raised an error while checking a set
    #[error("Verifier error: {0}")]
    Verifier(String),

    /// A worker panicked or went away while executing a request
    #[error("Worker error: {0}")]
    Worker(String),

    /// The pool was closed before the job was dispatched
    #[error("QUEUE_ABORTED")]
    QueueAborted,

    /// The worker returned fewer results than requests
    #[error("No job result for index {index}")]
    MissingResult { index: usize },

    /// The pool could not be built (thread pool, runtime, metrics)
    #[error("Pool setup failed: {0}")]
    Setup(String),
}

impl VerificationError {
    /// Build a worker error from a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "worker panicked".to_string()
        };
        Self::Worker(message)
    }

    /// Re-point an input error at `index` of the caller's list.
    ///
    /// Verifier calls on a single item report index 0; callers iterating a
    /// list use this to name the real position. Other variants pass through.
    pub fn at_index(self, index: usize) -> Self {
        match self {
            Self::InvalidPublicKey { reason, .. } => Self::InvalidPublicKey { index, reason },
            Self::InvalidSignature { reason, .. } => Self::InvalidSignature { index, reason },
            other => other,
        }
    }
}
