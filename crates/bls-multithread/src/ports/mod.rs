//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.
//! - **Inbound (Driving)**: API that callers use
//! - **Outbound (Driven)**: BLS primitives and workers this pool needs

pub mod inbound;
pub mod outbound;
