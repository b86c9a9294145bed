//! # Work Request Runner
//!
//! Executes a group of work requests on the current thread: batchable
//! requests are verified in chunks with one randomized batch check each, and
//! any chunk that does not pass is re-verified request by request.

use super::chunk::chunkify_maximize_chunk_size;
use super::entities::{SignatureSet, VerifySet, WorkBatchResult, WorkRequest, WorkResult};
use super::errors::VerificationError;
use super::job::effective_verify_set;
use crate::ports::outbound::Verifier;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Fewest sets worth checking with one batch call on the main-thread path.
const MIN_SET_COUNT_TO_BATCH: usize = 2;

/// Run `requests` and return one result per request, in request order.
///
/// A failed or erroring batch is never reported directly; it only causes the
/// requests of that chunk to be verified individually.
pub fn run_work_requests<V: Verifier>(
    verifier: &V,
    requests: &[WorkRequest<V::PublicKey, V::Signature>],
    batchable_min_per_chunk: usize,
) -> WorkBatchResult {
    let mut results: Vec<Option<WorkResult>> = vec![None; requests.len()];
    let mut batch_retries = 0;
    let mut batch_sigs_success = 0;

    let (batchable, mut non_batchable): (Vec<usize>, Vec<usize>) =
        (0..requests.len()).partition(|&i| requests[i].opts.batchable);

    for chunk in chunkify_maximize_chunk_size(batchable, batchable_min_per_chunk) {
        let sets: Vec<VerifySet<V::PublicKey, V::Signature>> = chunk
            .iter()
            .flat_map(|&i| requests[i].sets.iter().cloned())
            .collect();

        match guarded(|| verifier.verify_multiple_aggregate_signatures(&sets)) {
            Ok(true) => {
                batch_sigs_success += sets.len();
                for &i in &chunk {
                    results[i] = Some(Ok(true));
                }
            }
            Ok(false) => {
                batch_retries += 1;
                debug!(
                    requests = chunk.len(),
                    sets = sets.len(),
                    "[bls-pool] batch verification failed, retrying individually"
                );
                non_batchable.extend(chunk);
            }
            Err(e) => {
                batch_retries += 1;
                debug!(
                    requests = chunk.len(),
                    error = %e,
                    "[bls-pool] batch verification errored, retrying individually"
                );
                non_batchable.extend(chunk);
            }
        }
    }

    for i in non_batchable {
        let result = guarded(|| verify_each(verifier, &requests[i].sets));
        if let Err(e) = &result {
            warn!(request = i, error = %e, "[bls-pool] work request failed");
        }
        results[i] = Some(result);
    }

    WorkBatchResult {
        results: results
            .into_iter()
            .enumerate()
            .map(|(index, r)| r.unwrap_or(Err(VerificationError::MissingResult { index })))
            .collect(),
        batch_retries,
        batch_sigs_success,
    }
}

/// Verify signature sets synchronously in the caller's context.
///
/// Two or more sets are checked with one randomized batch call, a single set
/// with a plain verify.
///
/// # Errors
/// * `EmptySignatureSets` - `sets` is empty
/// * Any aggregation or verifier error for the sets
pub fn verify_signature_sets_now<V: Verifier>(
    verifier: &V,
    sets: &[SignatureSet<V::PublicKey, V::Signature>],
) -> Result<bool, VerificationError> {
    let verify_sets = sets
        .iter()
        .map(|set| effective_verify_set(verifier, set))
        .collect::<Result<Vec<_>, _>>()?;

    guarded(|| match verify_sets.len() {
        0 => Err(VerificationError::EmptySignatureSets),
        n if n < MIN_SET_COUNT_TO_BATCH => verify_each(verifier, &verify_sets),
        _ => verifier.verify_multiple_aggregate_signatures(&verify_sets),
    })
}

/// AND of plain verification over every set, stopping at the first `false`.
fn verify_each<V: Verifier>(
    verifier: &V,
    sets: &[VerifySet<V::PublicKey, V::Signature>],
) -> WorkResult {
    for set in sets {
        if !verifier.verify(&set.message, &set.public_key, &set.signature)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Turn a verifier panic into a worker error for the current request.
fn guarded<F>(f: F) -> WorkResult
where
    F: FnOnce() -> WorkResult,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let err = VerificationError::from_panic(payload.as_ref());
        warn!(error = %err, "[bls-pool] verifier panicked");
        Err(err)
    })
}
