//! # blst Verifier
//!
//! `Verifier` backed by the `blst` library, min-pk variant: public keys are
//! G1 points (48 bytes compressed), signatures G2 points (96 bytes).
//!
//! Batch verification draws a fresh non-zero 64-bit scalar per set, so a
//! forged combination of invalid signatures cannot cancel out.

use crate::domain::entities::{RandomScalar, VerifySet};
use crate::domain::errors::VerificationError;
use crate::ports::outbound::Verifier;
use blst::min_pk::{AggregatePublicKey, AggregateSignature, PublicKey, Signature};
use blst::{blst_scalar, MultiPoint, BLST_ERROR};
use std::slice;

/// Domain Separation Tag for BLS signatures (Ethereum proof-of-possession)
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Bits of randomness per set in batch verification.
const RAND_BITS: usize = 64;

/// Stateless `blst` verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlstVerifier;

impl BlstVerifier {
    pub fn new() -> Self {
        Self
    }
}

fn verify_outcome(result: BLST_ERROR) -> Result<bool, VerificationError> {
    match result {
        BLST_ERROR::BLST_SUCCESS => Ok(true),
        BLST_ERROR::BLST_VERIFY_FAIL => Ok(false),
        other => Err(VerificationError::Verifier(format!("{other:?}"))),
    }
}

fn to_blst_scalar(scalar: &RandomScalar) -> blst_scalar {
    let mut out = blst_scalar::default();
    out.b[..8].copy_from_slice(scalar.as_bytes());
    out
}

impl Verifier for BlstVerifier {
    type PublicKey = PublicKey;
    type Signature = Signature;

    fn verify(
        &self,
        message: &[u8],
        public_key: &PublicKey,
        signature: &Signature,
    ) -> Result<bool, VerificationError> {
        verify_outcome(signature.verify(true, message, DST, &[], public_key, true))
    }

    fn aggregate_public_keys(
        &self,
        public_keys: &[&PublicKey],
    ) -> Result<PublicKey, VerificationError> {
        if public_keys.is_empty() {
            return Err(VerificationError::Aggregation(
                "no public keys to aggregate".to_string(),
            ));
        }
        // Validate one by one so the error can name the key
        for (index, pk) in public_keys.iter().enumerate() {
            pk.validate()
                .map_err(|e| VerificationError::InvalidPublicKey {
                    index,
                    reason: format!("{e:?}"),
                })?;
        }
        AggregatePublicKey::aggregate(public_keys, false)
            .map(|agg| agg.to_public_key())
            .map_err(|e| VerificationError::Aggregation(format!("{e:?}")))
    }

    fn aggregate_signatures(
        &self,
        signatures: &[&Signature],
    ) -> Result<Signature, VerificationError> {
        if signatures.is_empty() {
            return Err(VerificationError::Aggregation(
                "no signatures to aggregate".to_string(),
            ));
        }
        for (index, sig) in signatures.iter().enumerate() {
            sig.validate(false)
                .map_err(|e| VerificationError::InvalidSignature {
                    index,
                    reason: format!("{e:?}"),
                })?;
        }
        AggregateSignature::aggregate(signatures, false)
            .map(|agg| agg.to_signature())
            .map_err(|e| VerificationError::Aggregation(format!("{e:?}")))
    }

    fn verify_multiple_aggregate_signatures(
        &self,
        sets: &[VerifySet<PublicKey, Signature>],
    ) -> Result<bool, VerificationError> {
        if sets.is_empty() {
            return Err(VerificationError::EmptySignatureSets);
        }

        let messages: Vec<&[u8]> = sets.iter().map(|s| s.message.as_slice()).collect();
        let public_keys: Vec<&PublicKey> = sets.iter().map(|s| &s.public_key).collect();
        let signatures: Vec<&Signature> = sets.iter().map(|s| &s.signature).collect();
        let rands: Vec<blst_scalar> = sets
            .iter()
            .map(|_| to_blst_scalar(&RandomScalar::random()))
            .collect();

        verify_outcome(Signature::verify_multiple_aggregate_signatures(
            &messages,
            DST,
            &public_keys,
            true,
            &signatures,
            true,
            &rands,
            RAND_BITS,
        ))
    }

    fn validate_signature(&self, signature: &Signature) -> Result<(), VerificationError> {
        signature
            .validate(true)
            .map_err(|e| VerificationError::InvalidSignature {
                index: 0,
                reason: format!("{e:?}"),
            })
    }

    fn multiply_public_key(
        &self,
        public_key: &PublicKey,
        scalar: &RandomScalar,
    ) -> Result<PublicKey, VerificationError> {
        Ok(slice::from_ref(public_key)
            .mult(scalar.as_bytes(), RAND_BITS)
            .to_public_key())
    }

    fn multiply_signature(
        &self,
        signature: &Signature,
        scalar: &RandomScalar,
    ) -> Result<Signature, VerificationError> {
        Ok(slice::from_ref(signature)
            .mult(scalar.as_bytes(), RAND_BITS)
            .to_signature())
    }
}
