//! Background Tasks Module
//!
//! Contains the tasks a cache runs outside of its callers' operations.
//!
//! # Tasks
//! - Deferred flush: coalesced manifest write at the next scheduling tick
//! - Prune: evicts stale entries of an aged cache at configured intervals

mod flush;
mod prune;

pub use flush::DeferredFlush;
pub use prune::spawn_prune_task;
