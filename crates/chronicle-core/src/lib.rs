//! Core types and trait definitions for the Chronicle audit subsystem.
//!
//! This crate is deliberately free of database and I/O dependencies. It
//! holds the closed registry of entity kinds, the immutable revision and
//! activity records, the tombstoned link rows, and the pure pieces of the
//! read pipeline (as-of predicates, set diffs, log aggregation).

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod diff;
pub mod error;
pub mod kind;
pub mod link;
pub mod revision;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
