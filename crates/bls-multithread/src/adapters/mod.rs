//! # Adapters Module
//!
//! Infrastructure adapters implementing the outbound ports.

pub mod blst_verifier;
pub mod pool;
