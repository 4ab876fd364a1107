use genjobs_core::error::CoreError;
use genjobs_core::provider::Provider;

/// Errors returned by [`JobOrchestrator`](crate::JobOrchestrator) for
/// caller misuse. Job failures are never returned; they are recorded on
/// the job record.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// No adapter is registered for the requested provider.
    #[error("No adapter registered for provider '{0}'")]
    UnsupportedProvider(Provider),

    /// The provider's adapter supplies a poll policy that could never
    /// poll or never time out.
    #[error("Invalid poll policy for provider '{provider}': {reason}")]
    InvalidPollPolicy { provider: Provider, reason: String },

    /// The orchestrator has been shut down and accepts no new jobs.
    #[error("Orchestrator has been shut down")]
    ShutDown,

    /// The handle or metadata failed validation.
    #[error("Invalid job: {0}")]
    InvalidJob(#[from] CoreError),
}
