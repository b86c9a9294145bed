//! Fuzz target for the blst verifier.
//!
//! Points are decoded from raw bytes the way a caller would receive them off
//! the wire. Whatever decodes must go through verification and same-message
//! blinding without panicking, and verification must be deterministic.

#![no_main]

use blst::min_pk::{PublicKey, Signature};
use bls_multithread::{BlstVerifier, RandomScalar, Verifier};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, arbitrary::Arbitrary)]
struct BlsFuzzInput {
    message: Vec<u8>,
    /// Compressed G1 point
    pubkey_bytes: [u8; 48],
    /// Compressed G2 point
    signature_bytes: [u8; 96],
}

fuzz_target!(|input: BlsFuzzInput| {
    let (Ok(public_key), Ok(signature)) = (
        PublicKey::from_bytes(&input.pubkey_bytes),
        Signature::from_bytes(&input.signature_bytes),
    ) else {
        return;
    };

    let verifier = BlstVerifier::new();
    let first = verifier.verify(&input.message, &public_key, &signature);
    let second = verifier.verify(&input.message, &public_key, &signature);
    assert_eq!(first, second);

    if verifier.validate_signature(&signature).is_ok() {
        let scalar = RandomScalar::random();
        let _ = verifier.multiply_public_key(&public_key, &scalar);
        let _ = verifier.multiply_signature(&signature, &scalar);
    }
});
