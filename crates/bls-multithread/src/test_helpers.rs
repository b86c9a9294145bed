//! Deterministic stand-in for the BLS primitives.
//!
//! Keys and signatures are `u64`. A secret key is its own public key and
//! `sign(sk, msg) = sk * h(msg)` with wrapping arithmetic, so aggregation
//! (wrapping sum) and blinding (wrapping multiply) keep the verification
//! equation linear just like the real pairing does.

use crate::domain::entities::{RandomScalar, VerifySet};
use crate::domain::errors::VerificationError;
use crate::ports::outbound::Verifier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Public key rejected as malformed.
pub const INVALID_PUBLIC_KEY: u64 = 0;
/// Signature rejected by the group check.
pub const INVALID_SIGNATURE: u64 = u64::MAX;
/// Any verification over this message panics.
pub const PANIC_MESSAGE: &[u8] = b"panic";

/// FNV-1a, forced odd so it is never zero.
pub fn message_hash(message: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in message {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash | 1
}

/// `(public_key, signature)` for secret key `sk` over `message`.
pub fn keypair(sk: u64, message: &[u8]) -> (u64, u64) {
    (sk, sk.wrapping_mul(message_hash(message)))
}

/// Counts calls so tests can assert batching behaviour.
#[derive(Debug, Default)]
pub struct MockVerifier {
    verify_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    multiply_calls: AtomicUsize,
    /// Optional delay inside every batch and verify call
    pub delay: Option<Duration>,
}

impl MockVerifier {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn multiply_calls(&self) -> usize {
        self.multiply_calls.load(Ordering::SeqCst)
    }

    /// Signature aggregated over several secret keys on one message.
    pub fn sign_aggregate(&self, sks: &[u64], message: &[u8]) -> u64 {
        sks.iter()
            .fold(0u64, |acc, sk| acc.wrapping_add(keypair(*sk, message).1))
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }

    fn check(&self, message: &[u8], public_key: u64, signature: u64) -> Result<bool, VerificationError> {
        if message == PANIC_MESSAGE {
            panic!("mock verifier asked to panic");
        }
        if public_key == INVALID_PUBLIC_KEY {
            return Err(VerificationError::InvalidPublicKey {
                index: 0,
                reason: "zero key".to_string(),
            });
        }
        Ok(signature == public_key.wrapping_mul(message_hash(message)))
    }
}

impl Verifier for MockVerifier {
    type PublicKey = u64;
    type Signature = u64;

    fn verify(&self, message: &[u8], public_key: &u64, signature: &u64) -> Result<bool, VerificationError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        self.check(message, *public_key, *signature)
    }

    fn aggregate_public_keys(&self, public_keys: &[&u64]) -> Result<u64, VerificationError> {
        if public_keys.is_empty() {
            return Err(VerificationError::Aggregation("no public keys".to_string()));
        }
        public_keys.iter().enumerate().try_fold(0u64, |acc, (index, pk)| {
            if **pk == INVALID_PUBLIC_KEY {
                Err(VerificationError::InvalidPublicKey {
                    index,
                    reason: "zero key".to_string(),
                })
            } else {
                Ok(acc.wrapping_add(**pk))
            }
        })
    }

    fn aggregate_signatures(&self, signatures: &[&u64]) -> Result<u64, VerificationError> {
        if signatures.is_empty() {
            return Err(VerificationError::Aggregation("no signatures".to_string()));
        }
        signatures.iter().enumerate().try_fold(0u64, |acc, (index, sig)| {
            if **sig == INVALID_SIGNATURE {
                Err(VerificationError::InvalidSignature {
                    index,
                    reason: "not in group".to_string(),
                })
            } else {
                Ok(acc.wrapping_add(**sig))
            }
        })
    }

    fn verify_multiple_aggregate_signatures(
        &self,
        sets: &[VerifySet<u64, u64>],
    ) -> Result<bool, VerificationError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        let mut all_valid = true;
        for set in sets {
            all_valid &= self.check(&set.message, set.public_key, set.signature)?;
        }
        Ok(all_valid)
    }

    fn validate_signature(&self, signature: &u64) -> Result<(), VerificationError> {
        if *signature == INVALID_SIGNATURE {
            return Err(VerificationError::InvalidSignature {
                index: 0,
                reason: "not in group".to_string(),
            });
        }
        Ok(())
    }

    fn multiply_public_key(&self, public_key: &u64, scalar: &RandomScalar) -> Result<u64, VerificationError> {
        self.multiply_calls.fetch_add(1, Ordering::SeqCst);
        Ok(public_key.wrapping_mul(scalar.value()))
    }

    fn multiply_signature(&self, signature: &u64, scalar: &RandomScalar) -> Result<u64, VerificationError> {
        self.multiply_calls.fetch_add(1, Ordering::SeqCst);
        Ok(signature.wrapping_mul(scalar.value()))
    }
}
