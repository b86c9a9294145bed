//! # BLS Multi-Threaded Verification Pool
//!
//! Verifies BLS12-381 signature sets on a pool of worker threads, batching
//! independent submissions together when callers allow it.
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): Jobs, the job queue list, chunking and the
//!   batch-then-retry runner. No I/O
//! - **Ports Layer** (`ports/`): The public API (`BlsVerificationApi`) and the
//!   `Verifier` / `WorkerRunner` seams
//! - **Adapters Layer** (`adapters/`): `blst` verifier, rayon worker pool
//! - **Service Layer** (`service.rs`): Buffering, dispatch and settlement
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bls_multithread::{BlsMultiThreading, BlsVerificationApi, BlstVerifier, PoolConfig};
//!
//! let pool = BlsMultiThreading::new(BlstVerifier::new(), PoolConfig::from_env())?;
//! let valid = pool.verify_signature_sets(sets, VerifyOptions::batchable()).await?;
//! ```
//!
//! ## Security Notes
//!
//! - **Batch verification** blinds every set with a fresh non-zero 64-bit
//!   scalar so one invalid set cannot cancel out another
//! - **Same-message aggregation** group-checks every signature before use
//! - A failed batch is always re-verified set by set; `false` is never
//!   reported for a set that was not itself checked

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
pub mod test_helpers;

// Re-export public API
pub use adapters::blst_verifier::{BlstVerifier, DST};
pub use adapters::pool::{InlineWorkerRunner, RayonWorkerPool};
pub use config::PoolConfig;
pub use domain::chunk::chunkify_maximize_chunk_size;
pub use domain::entities::{
    RandomScalar, SameMessagePair, SignatureSet, VerifyOptions, VerifySet, WorkBatchResult,
    WorkRequest, WorkResult,
};
pub use domain::errors::VerificationError;
pub use domain::linked_list::LinkedList;
pub use domain::runner::{run_work_requests, verify_signature_sets_now};
pub use ports::inbound::{BlsVerificationApi, VerificationFuture};
pub use ports::outbound::{Verifier, WorkerRunner};
pub use service::BlsMultiThreading;
