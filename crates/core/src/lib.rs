//! Shared domain types for generation job tracking.
//!
//! Holds the job record and its status machine, provider identifiers,
//! polling policies, and the status payload every provider adapter
//! normalises into.

pub mod error;
pub mod job;
pub mod provider;
pub mod types;
