//! Shared domain types for the Confab realtime meeting core.
//!
//! Everything here is plain data + the error taxonomy: no I/O, no runtime
//! state. Heavier crates (gateway, context, orchestration, worker) depend on
//! this one and never on each other's internals.

pub mod config;
pub mod error;
pub mod signaling;
pub mod stores;
pub mod stream;
pub mod tool;
pub mod transcript;
pub mod worker;

pub use error::{Error, Result};
