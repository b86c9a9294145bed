//! # Domain Layer
//!
//! Scheduling data structures and the synchronous verification logic.
//! No threads, no timers: those live in the service and the adapters.

pub mod chunk;
pub mod entities;
pub mod errors;
pub mod job;
pub mod linked_list;
pub mod runner;
