//! In-process orchestrator for long-running media generation jobs.
//!
//! [`JobOrchestrator`] tracks jobs submitted to external providers, polls
//! each one on its own timer, and finalizes every successful job at most
//! once even when overlapping poll ticks observe completion together.
//!
//! - [`registry`]: job records and per-job tick counts.
//! - [`guard`]: the two-set finalize guard.
//! - `scheduler`: per-job timers and the tick state machine.
//! - [`orchestrator`]: the public façade.
//! - [`events`]: job lifecycle events broadcast to subscribers.
//! - [`config`]: environment-driven configuration.

pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod orchestrator;
pub mod registry;
mod scheduler;

pub use config::{ConfigError, GenJobsConfig, OrchestratorConfig};
pub use error::OrchestratorError;
pub use events::JobEvent;
pub use orchestrator::JobOrchestrator;
